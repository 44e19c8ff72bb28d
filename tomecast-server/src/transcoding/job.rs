use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use tomecast_core::{JobKey, JobStatus, TranscodeVariant};

/// Everything the engine needs to schedule a transcode.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub book_id: String,
    pub source_audio_id: String,
    pub source_path: PathBuf,
    pub source_codec: String,
    pub variant: TranscodeVariant,
    pub priority: i32,
    /// Opaque id of the caller, used to report a failure to the callers
    /// that asked for the job.
    pub requested_by: String,
}

impl JobRequest {
    pub fn key(&self) -> JobKey {
        JobKey::new(self.source_audio_id.clone(), self.variant)
    }
}

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transcode job {0} not found")]
    NotFound(Uuid),

    #[error("transcode job {id} is {status}")]
    InvalidState { id: Uuid, status: JobStatus },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
