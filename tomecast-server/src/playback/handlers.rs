use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tomecast_core::{ClientCapabilities, JobStatus, TranscodeJob, TranscodeVariant};

use super::PlaybackPlan;
use crate::auth::AuthenticatedUser;
use crate::auth::middleware::authorize_book;
use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareRequest {
    pub book_id: String,
    pub audio_file_id: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub spatial: bool,
}

/// `POST /playback/prepare`
pub async fn prepare_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<PrepareRequest>,
) -> AppResult<Json<PlaybackPlan>> {
    authorize_book(&user, &request.book_id)?;

    let capabilities = ClientCapabilities::new(&request.capabilities, request.spatial);
    let plan = state
        .playback
        .prepare(&request.book_id, &request.audio_file_id, &capabilities, &user.id)
        .await?;
    Ok(Json(plan))
}

#[derive(Debug, Deserialize)]
pub struct ReprioritizeRequest {
    pub priority: i32,
}

/// Job as shown to clients. Server paths stay private.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: Uuid,
    pub book_id: String,
    pub source_audio_id: String,
    pub variant: TranscodeVariant,
    pub priority: i32,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TranscodeJob> for JobView {
    fn from(job: TranscodeJob) -> Self {
        Self {
            id: job.id,
            book_id: job.book_id,
            source_audio_id: job.source_audio_id,
            variant: job.variant,
            priority: job.priority,
            status: job.status,
            progress: job.progress,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

fn parse_job_id(id: &str) -> AppResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid job id"))
}

/// `GET /transcode/jobs/{id}`
///
/// A caller that sees a failed job here has been told the outcome; their
/// next prepare call queues a retry.
pub async fn job_status_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> AppResult<Json<JobView>> {
    let id = parse_job_id(&id)?;
    let job = state.playback.job_status(id)?;
    authorize_book(&user, &job.book_id)?;

    if job.status == JobStatus::Failed {
        state.engine.acknowledge_failure(id, &user.id);
    }
    Ok(Json(job.into()))
}

/// `POST /transcode/jobs/{id}/priority`
pub async fn reprioritize_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Json(request): Json<ReprioritizeRequest>,
) -> AppResult<Json<JobView>> {
    let id = parse_job_id(&id)?;
    let job = state.playback.job_status(id)?;
    authorize_book(&user, &job.book_id)?;

    Ok(Json(state.engine.reprioritize(id, request.priority)?.into()))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub transcoding: crate::transcoding::EngineStats,
}

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        transcoding: state.engine.stats(),
    })
}
