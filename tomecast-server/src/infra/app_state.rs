use std::{fmt, sync::Arc};

use tomecast_core::AudioCatalog;

use crate::auth::AccessVerifier;
use crate::infra::config::Config;
use crate::playback::PlaybackOrchestrator;
use crate::transcoding::TranscodeEngine;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<dyn AudioCatalog>,
    pub engine: Arc<TranscodeEngine>,
    pub access_verifier: Arc<dyn AccessVerifier>,
    pub playback: Arc<PlaybackOrchestrator>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        catalog: Arc<dyn AudioCatalog>,
        engine: Arc<TranscodeEngine>,
        access_verifier: Arc<dyn AccessVerifier>,
    ) -> Self {
        let playback = Arc::new(PlaybackOrchestrator::new(
            catalog.clone(),
            engine.clone(),
            config.transcoding.default_priority,
        ));
        Self {
            config,
            catalog,
            engine,
            access_verifier,
            playback,
        }
    }
}
