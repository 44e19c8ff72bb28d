use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

use super::{
    models::{
        AuthConfig, CacheConfig, Config, ConfigMetadata, CorsConfig, FfmpegConfig, LibraryConfig,
        ServerConfig, TranscodingConfig, DEFAULT_HOST, DEFAULT_JOB_TIMEOUT,
        DEFAULT_MAX_CONCURRENT_TRANSCODES, DEFAULT_PORT, DEFAULT_SEGMENT_SECONDS,
        DEFAULT_TRANSCODE_CACHE_DIR,
    },
    sources::{EnvConfig, FileConfig},
};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("tomecast.toml"),
        PathBuf::from("config/tomecast.toml"),
    ]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

/// Result of a successful load: the effective config plus non-fatal
/// findings worth logging at startup.
#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("config file {path} does not exist")]
    MissingConfig { path: PathBuf },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to load env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
    #[error("invalid duration for {field}: {value}")]
    InvalidDuration { field: &'static str, value: String },
    #[error("{0}")]
    Invalid(String),
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        let env_config = EnvConfig::gather();
        let (file_config, config_path) = self.load_file_config(&env_config)?;

        compose_config(
            file_config.unwrap_or_default(),
            env_config,
            ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        )
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env_config.config_path.clone());

        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigLoadError::MissingConfig { path });
                }
                path
            }
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(path) => path.clone(),
                None => return Ok((None, None)),
            },
        };

        let file = read_file_config(&path)?;
        Ok((Some(file), Some(path)))
    }
}

pub fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Layer environment values over file values over defaults.
pub fn compose_config(
    file: FileConfig,
    env: EnvConfig,
    metadata: ConfigMetadata,
) -> Result<ConfigLoad, ConfigLoadError> {
    let mut warnings = Vec::new();

    let server = ServerConfig {
        host: env
            .server_host
            .or(file.server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: env.server_port.or(file.server.port).unwrap_or(DEFAULT_PORT),
    };

    let cache = CacheConfig {
        transcode: env
            .cache_transcode
            .or(file.cache.transcode)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TRANSCODE_CACHE_DIR)),
    };

    let ffmpeg = FfmpegConfig {
        ffmpeg_path: env
            .ffmpeg_path
            .or(file.ffmpeg.ffmpeg_path)
            .unwrap_or_else(|| "ffmpeg".to_string()),
        ffprobe_path: env
            .ffprobe_path
            .or(file.ffmpeg.ffprobe_path)
            .unwrap_or_else(|| "ffprobe".to_string()),
    };

    let job_timeout = match env.job_timeout.or(file.transcoding.job_timeout) {
        Some(raw) => parse_duration("transcoding.job_timeout", &raw)?,
        None => DEFAULT_JOB_TIMEOUT,
    };

    let transcoding = TranscodingConfig {
        max_concurrent_transcodes: env
            .max_concurrent_transcodes
            .or(file.transcoding.max_concurrent_transcodes)
            .unwrap_or(DEFAULT_MAX_CONCURRENT_TRANSCODES),
        job_timeout,
        segment_seconds: file
            .transcoding
            .segment_seconds
            .unwrap_or(DEFAULT_SEGMENT_SECONDS),
        default_priority: file.transcoding.default_priority.unwrap_or(0),
    };

    if transcoding.max_concurrent_transcodes == 0 {
        return Err(ConfigLoadError::Invalid(
            "transcoding.max_concurrent_transcodes must be at least 1".into(),
        ));
    }
    if transcoding.segment_seconds == 0 {
        return Err(ConfigLoadError::Invalid(
            "transcoding.segment_seconds must be at least 1".into(),
        ));
    }

    let library = LibraryConfig {
        manifest: env.library_manifest.or(file.library.manifest),
    };
    if library.manifest.is_none() {
        warnings.push("no library manifest configured; catalog will be empty".into());
    }

    let auth = AuthConfig {
        tokens: file.auth.tokens,
    };
    if auth.tokens.is_empty() {
        warnings.push("no access tokens configured; every request will be rejected".into());
    }

    let cors = CorsConfig {
        allowed_origins: env
            .cors_allowed_origins
            .or(file.cors.allowed_origins)
            .unwrap_or_default(),
    };
    if cors.is_wildcard_included() {
        warnings.push("CORS allows any origin".into());
    }

    Ok(ConfigLoad {
        config: Config {
            server,
            cache,
            ffmpeg,
            transcoding,
            library,
            auth,
            cors,
            metadata,
        },
        warnings,
    })
}

fn parse_duration(field: &'static str, raw: &str) -> Result<Duration, ConfigLoadError> {
    humantime::parse_duration(raw.trim()).map_err(|_| ConfigLoadError::InvalidDuration {
        field,
        value: raw.to_string(),
    })
}
