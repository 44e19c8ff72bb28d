use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::MediaError;

/// Transcoded rendition of a source file.
///
/// Each variant is scheduled, cached and served independently.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeVariant {
    #[default]
    Stereo,
    Spatial,
}

impl TranscodeVariant {
    pub const ALL: [TranscodeVariant; 2] = [Self::Stereo, Self::Spatial];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stereo => "stereo",
            Self::Spatial => "spatial",
        }
    }
}

impl fmt::Display for TranscodeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranscodeVariant {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stereo" => Ok(Self::Stereo),
            "spatial" => Ok(Self::Spatial),
            other => Err(MediaError::InvalidInput(format!(
                "unknown transcode variant: {other}"
            ))),
        }
    }
}

/// Lifecycle state of a transcode job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Pending | Self::Running => false,
            Self::Completed | Self::Failed => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplication key: at most one live job exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobKey {
    pub source_audio_id: String,
    pub variant: TranscodeVariant,
}

impl JobKey {
    pub fn new(source_audio_id: impl Into<String>, variant: TranscodeVariant) -> Self {
        Self {
            source_audio_id: source_audio_id.into(),
            variant,
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_audio_id, self.variant)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeJob {
    pub id: Uuid,
    /// Book the source file belongs to; access to the job follows it.
    #[serde(default)]
    pub book_id: String,
    pub source_audio_id: String,
    pub source_path: PathBuf,
    pub source_codec: String,
    pub variant: TranscodeVariant,
    /// Higher values are scheduled sooner.
    pub priority: i32,
    pub status: JobStatus,
    /// Percent complete, 0-100. Never decreases.
    pub progress: u8,
    /// Populated only when `status` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set once the job starts running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranscodeJob {
    pub fn new(
        source_audio_id: impl Into<String>,
        source_path: impl Into<PathBuf>,
        source_codec: impl Into<String>,
        variant: TranscodeVariant,
        priority: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            book_id: String::new(),
            source_audio_id: source_audio_id.into(),
            source_path: source_path.into(),
            source_codec: source_codec.into(),
            variant,
            priority,
            status: JobStatus::Pending,
            progress: 0,
            error: None,
            output_dir: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_book(mut self, book_id: impl Into<String>) -> Self {
        self.book_id = book_id.into();
        self
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.source_audio_id.clone(), self.variant)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn mark_running(&mut self, output_dir: PathBuf) {
        self.status = JobStatus::Running;
        self.output_dir = Some(output_dir);
        self.touch();
    }

    /// Raise progress; lower values are ignored. Running jobs stay below 100
    /// until they are marked completed.
    pub fn record_progress(&mut self, percent: u8) {
        if self.status != JobStatus::Running {
            return;
        }
        let clamped = percent.min(99);
        if clamped > self.progress {
            self.progress = clamped;
            self.touch();
        }
    }

    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.error = None;
        self.touch();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TranscodeJob {
        TranscodeJob::new("audio-1", "/books/a.ac4", "ac4", TranscodeVariant::Stereo, 0)
    }

    #[test]
    fn progress_is_monotonic_and_capped_while_running() {
        let mut job = job();
        job.record_progress(40);
        assert_eq!(job.progress, 0, "pending jobs ignore progress");

        job.mark_running(PathBuf::from("/cache/x/stereo"));
        job.record_progress(40);
        job.record_progress(20);
        assert_eq!(job.progress, 40);

        job.record_progress(100);
        assert_eq!(job.progress, 99);

        job.mark_completed();
        assert_eq!(job.progress, 100);
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn failure_records_error() {
        let mut job = job();
        job.mark_running(PathBuf::from("/cache/x/stereo"));
        job.mark_failed("ffmpeg exited with status 1");
        assert!(job.is_terminal());
        assert_eq!(job.error.as_deref(), Some("ffmpeg exited with status 1"));
    }

    #[test]
    fn variant_parses_case_insensitively() {
        assert_eq!("Spatial".parse::<TranscodeVariant>().unwrap(), TranscodeVariant::Spatial);
        assert!("surround".parse::<TranscodeVariant>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        let value = serde_json::to_value(JobStatus::Running).unwrap();
        assert_eq!(value, serde_json::json!("running"));
    }
}
