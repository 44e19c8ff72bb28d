pub mod loader;
pub mod models;
pub mod sources;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    AuthConfig, CacheConfig, Config, ConfigMetadata, CorsConfig, FfmpegConfig, LibraryConfig,
    ServerConfig, TokenGrant, TranscodingConfig,
};
