//! Boundary to the library catalog.
//!
//! The catalog owns book and file metadata; the streaming engine only needs
//! to resolve a `(book, file)` pair to an [`AudioSource`].

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::audio::AudioSource;
use crate::error::Result;

#[async_trait]
pub trait AudioCatalog: Send + Sync {
    /// Look up a file of a book. Returns `Ok(None)` when either is unknown or
    /// the file does not belong to the book.
    async fn get_audio(&self, book_id: &str, file_id: &str) -> Result<Option<AudioSource>>;
}

#[derive(Debug, Deserialize)]
struct CatalogManifest {
    #[serde(default)]
    sources: Vec<AudioSource>,
}

/// In-memory catalog, usually loaded from a JSON manifest of the form
/// `{"sources": [ {AudioSource}, ... ]}`.
#[derive(Debug, Default, Clone)]
pub struct JsonCatalog {
    sources: HashMap<(String, String), AudioSource>,
}

impl JsonCatalog {
    pub fn new(sources: impl IntoIterator<Item = AudioSource>) -> Self {
        let sources = sources
            .into_iter()
            .map(|s| ((s.book_id.clone(), s.id.clone()), s))
            .collect();
        Self { sources }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let manifest: CatalogManifest = serde_json::from_str(json)?;
        Ok(Self::new(manifest.sources))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let catalog = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            sources = catalog.len(),
            "library manifest loaded"
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl AudioCatalog for JsonCatalog {
    async fn get_audio(&self, book_id: &str, file_id: &str) -> Result<Option<AudioSource>> {
        Ok(self
            .sources
            .get(&(book_id.to_string(), file_id.to_string()))
            .cloned())
    }
}
