use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use tomecast_core::TranscodeVariant;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to start transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("transcoder exited with status {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()))]
    Exit { code: Option<i32>, stderr: String },

    #[error("transcode timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    #[error("transcoder produced no valid manifest at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Callback through which a transcoder reports percent complete.
#[derive(Clone)]
pub struct ProgressSink {
    report: Arc<dyn Fn(u8) + Send + Sync>,
}

impl ProgressSink {
    pub fn new(report: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            report: Arc::new(report),
        }
    }

    /// A sink that drops every update.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, percent: u8) {
        (self.report)(percent.min(100));
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink").finish_non_exhaustive()
    }
}

/// Turns a source file into an HLS rendition inside `output_dir`.
///
/// Implementations must leave `playlist.m3u8` plus its segments in
/// `output_dir` on success. The engine validates the manifest afterwards
/// and treats anything else as a failure.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        source: &Path,
        variant: TranscodeVariant,
        output_dir: &Path,
        progress: ProgressSink,
    ) -> Result<(), TranscodeError>;
}
