//! Playback preparation: negotiate, schedule a transcode when needed, and
//! tell the client where to stream from.

pub mod handlers;

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use tomecast_core::codec::TRANSCODED_CODEC;
use tomecast_core::negotiate::decide;
use tomecast_core::{AudioCatalog, ClientCapabilities, JobStatus, MediaError, TranscodeJob};

use crate::transcoding::{EngineError, JobRequest, TranscodeEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackVariant {
    Original,
    Transcoded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackPlan {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    pub variant: PlaybackVariant,
    pub codec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcode_job_id: Option<Uuid>,
    pub progress: u8,
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("audio file {file_id} not found in book {book_id}")]
    NotFound { book_id: String, file_id: String },

    #[error("{0}")]
    TranscodeFailed(String),

    #[error(transparent)]
    Catalog(#[from] MediaError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub struct PlaybackOrchestrator {
    catalog: Arc<dyn AudioCatalog>,
    engine: Arc<TranscodeEngine>,
    priority: i32,
}

impl std::fmt::Debug for PlaybackOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackOrchestrator")
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl PlaybackOrchestrator {
    pub fn new(catalog: Arc<dyn AudioCatalog>, engine: Arc<TranscodeEngine>, priority: i32) -> Self {
        Self {
            catalog,
            engine,
            priority,
        }
    }

    pub async fn prepare(
        &self,
        book_id: &str,
        audio_file_id: &str,
        capabilities: &ClientCapabilities,
        requested_by: &str,
    ) -> Result<PlaybackPlan, PlaybackError> {
        let source = self
            .catalog
            .get_audio(book_id, audio_file_id)
            .await?
            .ok_or_else(|| PlaybackError::NotFound {
                book_id: book_id.to_string(),
                file_id: audio_file_id.to_string(),
            })?;

        let decision = decide(
            &source.codec,
            &capabilities.codecs,
            capabilities.prefer_spatial,
            source.is_multichannel(),
        );

        if decision.play_original {
            debug!(book_id, file_id = audio_file_id, codec = %source.codec, "serving original");
            return Ok(PlaybackPlan {
                ready: true,
                stream_url: Some(original_url(book_id, audio_file_id)),
                variant: PlaybackVariant::Original,
                codec: source.normalized_codec(),
                transcode_job_id: None,
                progress: 100,
            });
        }

        let job = self
            .engine
            .create_or_get_job(JobRequest {
                book_id: book_id.to_string(),
                source_audio_id: source.id.clone(),
                source_path: source.path.clone(),
                source_codec: source.normalized_codec(),
                variant: decision.variant,
                priority: self.priority,
                requested_by: requested_by.to_string(),
            })
            .await?;

        plan_for_job(book_id, audio_file_id, &job)
    }

    pub fn job_status(&self, id: Uuid) -> Result<TranscodeJob, PlaybackError> {
        Ok(self.engine.get_job(id)?)
    }
}

fn plan_for_job(
    book_id: &str,
    audio_file_id: &str,
    job: &TranscodeJob,
) -> Result<PlaybackPlan, PlaybackError> {
    match job.status {
        JobStatus::Completed => Ok(PlaybackPlan {
            ready: true,
            stream_url: Some(manifest_url(book_id, audio_file_id, job)),
            variant: PlaybackVariant::Transcoded,
            codec: TRANSCODED_CODEC.to_string(),
            transcode_job_id: Some(job.id),
            progress: 100,
        }),
        JobStatus::Failed => {
            let error = job
                .error
                .clone()
                .unwrap_or_else(|| "unknown transcode error".to_string());
            info!(job_id = %job.id, error = %error, "prepare hit failed transcode");
            Err(PlaybackError::TranscodeFailed(error))
        }
        JobStatus::Pending | JobStatus::Running => Ok(PlaybackPlan {
            ready: false,
            stream_url: None,
            variant: PlaybackVariant::Transcoded,
            codec: TRANSCODED_CODEC.to_string(),
            transcode_job_id: Some(job.id),
            progress: job.progress,
        }),
    }
}

pub fn original_url(book_id: &str, audio_file_id: &str) -> String {
    format!("/audio/{book_id}/{audio_file_id}")
}

pub fn manifest_url(book_id: &str, audio_file_id: &str, job: &TranscodeJob) -> String {
    format!(
        "/audio/{book_id}/{audio_file_id}/transcode/playlist.m3u8?variant={}",
        job.variant
    )
}
