use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::codec;

/// One playable audio file as recorded by the library catalog.
///
/// Sources are immutable once scanned; the streaming engine only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSource {
    pub id: String,
    pub book_id: String,
    pub path: PathBuf,
    /// Canonical codec name, see [`codec::normalize`].
    pub codec: String,
    pub container: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub bitrate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

fn default_channels() -> u16 {
    2
}

impl AudioSource {
    pub fn normalized_codec(&self) -> String {
        codec::normalize(&self.codec)
    }

    pub fn is_multichannel(&self) -> bool {
        self.channels > 2
    }
}

/// Decode capabilities declared by the requesting client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientCapabilities {
    /// Normalized codec names the client decodes natively.
    pub codecs: HashSet<String>,
    pub prefer_spatial: bool,
}

impl ClientCapabilities {
    pub fn new<I, S>(codecs: I, prefer_spatial: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            codecs: codecs
                .into_iter()
                .map(|c| codec::normalize(c.as_ref()))
                .filter(|c| !c.is_empty())
                .collect(),
            prefer_spatial,
        }
    }

    pub fn supports(&self, codec_name: &str) -> bool {
        self.codecs.contains(&codec::normalize(codec_name))
    }
}
