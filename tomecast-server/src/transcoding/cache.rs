use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use uuid::Uuid;

use tomecast_core::{JobKey, TranscodeJob, TranscodeVariant};

pub const MANIFEST_FILE: &str = "playlist.m3u8";
pub const SEGMENT_PATTERN: &str = "segment_%05d.ts";
pub const SIDECAR_FILE: &str = "job.json";

const MANIFEST_MAGIC: &[u8] = b"#EXTM3U";

/// Metadata written next to a completed manifest so the cache can be
/// re-adopted after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSidecar {
    pub job_id: Uuid,
    #[serde(default)]
    pub book_id: String,
    pub source_audio_id: String,
    pub source_path: PathBuf,
    pub source_codec: String,
    pub variant: TranscodeVariant,
    pub completed_at: DateTime<Utc>,
}

impl CacheSidecar {
    pub fn from_job(job: &TranscodeJob) -> Self {
        Self {
            job_id: job.id,
            book_id: job.book_id.clone(),
            source_audio_id: job.source_audio_id.clone(),
            source_path: job.source_path.clone(),
            source_codec: job.source_codec.clone(),
            variant: job.variant,
            completed_at: Utc::now(),
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.source_audio_id.clone(), self.variant)
    }
}

/// Deterministic on-disk layout of transcoded output:
/// `<root>/<key hash>/<variant>/{playlist.m3u8, segment_*.ts, job.json}`.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_dir(&self, key: &JobKey) -> PathBuf {
        self.root
            .join(key_hash(&key.source_audio_id, key.variant))
            .join(key.variant.as_str())
    }

    pub fn manifest_path(output_dir: &Path) -> PathBuf {
        output_dir.join(MANIFEST_FILE)
    }

    /// A manifest counts as present only if it is non-empty and starts with
    /// the HLS magic line.
    pub async fn has_valid_manifest(&self, output_dir: &Path) -> bool {
        let path = Self::manifest_path(output_dir);
        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(_) => return false,
        };
        let mut head = [0u8; MANIFEST_MAGIC.len()];
        match file.read_exact(&mut head).await {
            Ok(_) => head == MANIFEST_MAGIC,
            Err(_) => false,
        }
    }

    /// Remove whatever a previous attempt left behind and recreate the
    /// directory empty.
    pub async fn prepare_output_dir(&self, output_dir: &Path) -> io::Result<()> {
        self.remove_output_dir(output_dir).await?;
        fs::create_dir_all(output_dir).await
    }

    pub async fn remove_output_dir(&self, output_dir: &Path) -> io::Result<()> {
        match fs::remove_dir_all(output_dir).await {
            Ok(()) => {
                debug!(dir = %output_dir.display(), "removed transcode output");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub async fn write_sidecar(&self, output_dir: &Path, sidecar: &CacheSidecar) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(sidecar)?;
        fs::write(output_dir.join(SIDECAR_FILE), json).await
    }

    pub async fn read_sidecar(&self, output_dir: &Path) -> io::Result<CacheSidecar> {
        let raw = fs::read(output_dir.join(SIDECAR_FILE)).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Walk the cache root and return the sidecars of every variant
    /// directory holding a valid manifest. Entries whose sidecar does not
    /// hash back to their own directory are skipped.
    pub async fn scan(&self) -> io::Result<Vec<(PathBuf, CacheSidecar)>> {
        let mut found = Vec::new();
        let mut keys = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(found),
            Err(err) => return Err(err),
        };

        while let Some(key_dir) = keys.next_entry().await? {
            if !key_dir.file_type().await?.is_dir() {
                continue;
            }
            for variant in TranscodeVariant::ALL {
                let output_dir = key_dir.path().join(variant.as_str());
                if !self.has_valid_manifest(&output_dir).await {
                    continue;
                }
                match self.read_sidecar(&output_dir).await {
                    Ok(sidecar) if self.output_dir(&sidecar.key()) == output_dir => {
                        found.push((output_dir, sidecar));
                    }
                    Ok(_) => {
                        warn!(dir = %output_dir.display(), "sidecar does not match its directory");
                    }
                    Err(err) => {
                        debug!(dir = %output_dir.display(), error = %err, "skipping cache entry without sidecar");
                    }
                }
            }
        }

        Ok(found)
    }
}

/// First 32 hex characters of `sha256(source_audio_id || 0x00 || variant)`.
pub fn key_hash(source_audio_id: &str, variant: TranscodeVariant) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_audio_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(variant.as_str().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}
