use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8085;
pub const DEFAULT_TRANSCODE_CACHE_DIR: &str = "./cache/transcode";
pub const DEFAULT_MAX_CONCURRENT_TRANSCODES: usize = 2;
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(3600);
pub const DEFAULT_SEGMENT_SECONDS: u32 = 4;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub ffmpeg: FfmpegConfig,
    pub transcoding: TranscodingConfig,
    pub library: LibraryConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
    pub metadata: ConfigMetadata,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
            },
            cache: CacheConfig {
                transcode: PathBuf::from(DEFAULT_TRANSCODE_CACHE_DIR),
            },
            ffmpeg: FfmpegConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                ffprobe_path: "ffprobe".to_string(),
            },
            transcoding: TranscodingConfig::default(),
            library: LibraryConfig { manifest: None },
            auth: AuthConfig { tokens: Vec::new() },
            cors: CorsConfig {
                allowed_origins: Vec::new(),
            },
            metadata: ConfigMetadata::default(),
        }
    }
}

impl Config {
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.cache.transcode)?;
        Ok(())
    }

    /// Canonicalize the cache root so containment checks compare absolute
    /// paths. Called once at startup, after `ensure_directories`.
    pub fn normalize_paths(&mut self) -> anyhow::Result<()> {
        self.cache.transcode = std::fs::canonicalize(&self.cache.transcode)?;
        Ok(())
    }

    pub fn transcode_cache_dir(&self) -> &Path {
        &self.cache.transcode
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub transcode: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

#[derive(Debug, Clone)]
pub struct TranscodingConfig {
    /// Size of the worker pool.
    pub max_concurrent_transcodes: usize,
    pub job_timeout: Duration,
    pub segment_seconds: u32,
    /// Priority given to jobs created by playback preparation.
    pub default_priority: i32,
}

impl Default for TranscodingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transcodes: DEFAULT_MAX_CONCURRENT_TRANSCODES,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            segment_seconds: DEFAULT_SEGMENT_SECONDS,
            default_priority: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// JSON manifest describing the audio sources of the library.
    pub manifest: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub tokens: Vec<TokenGrant>,
}

/// A static access token and the permissions of the user it identifies.
#[derive(Clone, Deserialize, Serialize)]
pub struct TokenGrant {
    pub token: String,
    pub user_id: String,
    #[serde(default = "default_true")]
    pub can_download: bool,
    /// Books the user may access. `None` grants the whole library.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub books: Option<HashSet<String>>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("can_download", &self.can_download)
            .field("books", &self.books)
            .finish()
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn is_wildcard_included(&self) -> bool {
        self.allowed_origins
            .iter()
            .any(|origin| origin.trim() == "*")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
