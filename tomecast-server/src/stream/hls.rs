//! Resolution of HLS artifact paths inside a job's output directory.

use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("path escapes the output directory")]
    Escapes,
    #[error("artifact not found")]
    NotFound,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Resolve `requested` under `output_dir`.
///
/// The joined path is cleaned lexically first, then canonicalized so
/// symlinks cannot point outside. Containment is checked on whole path
/// components, so `stereo_evil` is not inside `stereo`.
pub async fn resolve_artifact(output_dir: &Path, requested: &str) -> Result<PathBuf, ArtifactError> {
    let relative = Path::new(requested);
    if requested.is_empty()
        || relative
            .components()
            .any(|c| matches!(c, Component::RootDir | Component::Prefix(_)))
    {
        return Err(ArtifactError::Escapes);
    }

    let cleaned = clean_path(&output_dir.join(relative));
    if !cleaned.starts_with(output_dir) {
        return Err(ArtifactError::Escapes);
    }

    let root = match tokio::fs::canonicalize(output_dir).await {
        Ok(root) => root,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(ArtifactError::NotFound),
        Err(err) => return Err(err.into()),
    };
    let resolved = match tokio::fs::canonicalize(&cleaned).await {
        Ok(resolved) => resolved,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(ArtifactError::NotFound),
        Err(err) => return Err(err.into()),
    };

    if !resolved.starts_with(&root) {
        return Err(ArtifactError::Escapes);
    }
    Ok(resolved)
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

pub fn artifact_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        Some("m4s") => "video/iso.segment",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}
