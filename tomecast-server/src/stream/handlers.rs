use axum::{
    Extension,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::Response,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::io::SeekFrom;
use std::path::Path as FsPath;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use tomecast_core::codec::audio_content_type;
use tomecast_core::{JobKey, JobStatus, TranscodeVariant};

use super::hls::{ArtifactError, artifact_content_type, resolve_artifact};
use super::range::{RangeError, parse_range_header};
use crate::auth::AuthenticatedUser;
use crate::auth::middleware::authorize_book;
use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};
use crate::transcoding::cache::SIDECAR_FILE;

const ARTIFACT_CACHE_CONTROL: &str = "public, max-age=3600";

/// `GET|HEAD /audio/{book_id}/{file_id}`
pub async fn stream_audio_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    method: Method,
    Path((book_id, file_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> AppResult<Response> {
    authorize_book(&user, &book_id)?;

    let source = state
        .catalog
        .get_audio(&book_id, &file_id)
        .await?
        .ok_or_else(|| AppError::not_found("audio file not found"))?;

    let mut file = File::open(&source.path).await.map_err(|err| {
        warn!(path = %source.path.display(), error = %err, "audio file unreadable");
        AppError::not_found("audio file not found")
    })?;
    let metadata = file
        .metadata()
        .await
        .map_err(|err| AppError::internal(format!("failed to stat audio file: {err}")))?;
    let size = metadata.len();

    let range = match headers.get(header::RANGE) {
        None => None,
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| AppError::bad_request("malformed range header"))?;
            match parse_range_header(raw, size) {
                Ok(range) => Some(range),
                Err(RangeError::Malformed) => {
                    return Err(AppError::bad_request("malformed range header"));
                }
                Err(RangeError::Unsatisfiable) => {
                    return Err(AppError::range_not_satisfiable(size));
                }
            }
        }
    };

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, audio_content_type(&source.container))
        .header(header::ACCEPT_RANGES, "bytes");
    if let Ok(modified) = metadata.modified() {
        builder = builder.header(header::LAST_MODIFIED, httpdate::fmt_http_date(modified));
    }

    let (status, length) = match range {
        Some(range) => {
            builder = builder.header(header::CONTENT_RANGE, range.content_range(size));
            (StatusCode::PARTIAL_CONTENT, range.length())
        }
        None => (StatusCode::OK, size),
    };
    builder = builder
        .status(status)
        .header(header::CONTENT_LENGTH, length);

    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        if let Some(range) = range {
            file.seek(SeekFrom::Start(range.start))
                .await
                .map_err(|err| AppError::internal(format!("failed to seek audio file: {err}")))?;
        }
        Body::from_stream(track_transfer(
            ReaderStream::new(file.take(length)),
            length,
            file_id,
        ))
    };

    builder
        .body(body)
        .map_err(|err| AppError::internal(format!("failed to build response: {err}")))
}

#[derive(Debug, Deserialize)]
pub struct VariantQuery {
    pub variant: Option<String>,
}

/// `GET /audio/{book_id}/{file_id}/transcode/{*path}?variant=`
pub async fn hls_artifact_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((book_id, file_id, path)): Path<(String, String, String)>,
    Query(query): Query<VariantQuery>,
) -> AppResult<Response> {
    authorize_book(&user, &book_id)?;

    let variant = match query.variant.as_deref() {
        Some(raw) => raw.parse::<TranscodeVariant>()?,
        None => TranscodeVariant::Stereo,
    };

    let source = state
        .catalog
        .get_audio(&book_id, &file_id)
        .await?
        .ok_or_else(|| AppError::not_found("audio file not found"))?;

    let job = state
        .engine
        .find_job(&JobKey::new(source.id.clone(), variant))
        .filter(|job| job.status == JobStatus::Completed)
        .ok_or_else(|| AppError::not_found("transcode not available"))?;
    let output_dir = job
        .output_dir
        .ok_or_else(|| AppError::not_found("transcode not available"))?;

    let resolved = match resolve_artifact(&output_dir, &path).await {
        Ok(resolved) => resolved,
        Err(ArtifactError::Escapes) => {
            warn!(requested = %path, "rejected HLS path outside output directory");
            return Err(AppError::bad_request("invalid artifact path"));
        }
        Err(ArtifactError::NotFound) => return Err(AppError::not_found("artifact not found")),
        Err(ArtifactError::Io(err)) => {
            return Err(AppError::internal(format!("failed to resolve artifact: {err}")));
        }
    };
    if resolved.file_name().is_some_and(|name| name == SIDECAR_FILE) {
        return Err(AppError::not_found("artifact not found"));
    }

    serve_artifact(&resolved).await
}

async fn serve_artifact(path: &FsPath) -> AppResult<Response> {
    let file = File::open(path)
        .await
        .map_err(|_| AppError::not_found("artifact not found"))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|err| AppError::internal(format!("failed to stat artifact: {err}")))?;
    if !metadata.is_file() {
        return Err(AppError::not_found("artifact not found"));
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact_content_type(path))
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(header::CACHE_CONTROL, ARTIFACT_CACHE_CONTROL)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|err| AppError::internal(format!("failed to build response: {err}")))
}

/// Logs a body that was dropped before all bytes were sent. That happens
/// when the client goes away and is not a server error.
struct TransferGuard {
    file_id: String,
    expected: u64,
    sent: u64,
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        if self.sent < self.expected {
            debug!(
                file_id = %self.file_id,
                sent = self.sent,
                expected = self.expected,
                "client disconnected during audio stream"
            );
        }
    }
}

fn track_transfer<S>(
    stream: S,
    expected: u64,
    file_id: String,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
{
    let mut guard = TransferGuard {
        file_id,
        expected,
        sent: 0,
    };
    stream.map(move |chunk| {
        match &chunk {
            Ok(bytes) => guard.sent += bytes.len() as u64,
            Err(err) => debug!(file_id = %guard.file_id, error = %err, "audio stream read error"),
        }
        chunk
    })
}
