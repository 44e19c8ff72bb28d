use async_trait::async_trait;
use axum_test::TestServer;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use tomecast_core::{AudioSource, JsonCatalog, TranscodeVariant};
use tomecast_server::{
    AppState,
    auth::StaticTokenVerifier,
    infra::config::{Config, TokenGrant},
    routes::create_router,
    transcoding::{EngineConfig, ProgressSink, TranscodeEngine, TranscodeError, Transcoder},
};

pub const ADMIN_TOKEN: &str = "admin-token";
pub const LISTENER_TOKEN: &str = "listener-token";
pub const NO_DOWNLOAD_TOKEN: &str = "no-download-token";

pub const AAC_FILE: &str = "f-aac";
pub const AC4_FILE: &str = "f-ac4";
pub const BOOK: &str = "b1";
pub const OTHER_BOOK: &str = "b2";
pub const OTHER_FILE: &str = "f-mp3";

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// 1000 bytes whose value at offset `i` is `i % 251`.
pub fn fixture_bytes() -> Vec<u8> {
    (0..1000u32).map(|i| (i % 251) as u8).collect()
}

/// In-process stand-in for ffmpeg.
///
/// Reports some progress, optionally waits for a permit from `gate`, then
/// either fails or writes a small HLS rendition.
#[derive(Default)]
pub struct FakeTranscoder {
    pub calls: AtomicUsize,
    pub started: Mutex<Vec<(PathBuf, TranscodeVariant)>>,
    pub fail_with: Mutex<Option<String>>,
    pub gate: Option<Arc<Semaphore>>,
}

impl FakeTranscoder {
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, message: &str) {
        *self.fail_with.lock() = Some(message.to_string());
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        source: &Path,
        variant: TranscodeVariant,
        output_dir: &Path,
        progress: ProgressSink,
    ) -> Result<(), TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.lock().push((source.to_path_buf(), variant));

        for percent in [10, 35, 60] {
            progress.report(percent);
            tokio::task::yield_now().await;
        }

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        if let Some(message) = self.fail_with.lock().take() {
            return Err(TranscodeError::Exit {
                code: Some(1),
                stderr: message,
            });
        }

        tokio::fs::write(
            output_dir.join("playlist.m3u8"),
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n#EXT-X-PLAYLIST-TYPE:VOD\n#EXTINF:4.0,\nsegment_00000.ts\n#EXT-X-ENDLIST\n",
        )
        .await?;
        tokio::fs::write(output_dir.join("segment_00000.ts"), vec![0x47u8; 188]).await?;
        progress.report(100);
        Ok(())
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub transcoder: Arc<FakeTranscoder>,
    pub dir: TempDir,
}

impl TestApp {
    pub fn cache_root(&self) -> PathBuf {
        self.state.config.cache.transcode.clone()
    }
}

pub async fn build_test_app() -> TestApp {
    build_test_app_with(FakeTranscoder::default(), 2).await
}

pub async fn build_test_app_with(transcoder: FakeTranscoder, workers: usize) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let library = dir.path().join("library");
    tokio::fs::create_dir_all(&library).await.expect("library dir");

    let aac_path = library.join("chapter1.m4b");
    let ac4_path = library.join("chapter1.ac4");
    let mp3_path = library.join("other.mp3");
    tokio::fs::write(&aac_path, fixture_bytes()).await.expect("aac fixture");
    tokio::fs::write(&ac4_path, fixture_bytes()).await.expect("ac4 fixture");
    tokio::fs::write(&mp3_path, fixture_bytes()).await.expect("mp3 fixture");

    let catalog = JsonCatalog::new([
        source(AAC_FILE, BOOK, aac_path, "aac", "m4b", 2),
        source(AC4_FILE, BOOK, ac4_path, "ac4", "ac4", 6),
        source(OTHER_FILE, OTHER_BOOK, mp3_path, "mp3", "mp3", 2),
    ]);

    let cache = dir.path().join("cache");
    tokio::fs::create_dir_all(&cache).await.expect("cache dir");
    let cache = tokio::fs::canonicalize(&cache).await.expect("canonical cache");

    let mut config = Config::default();
    config.cache.transcode = cache.clone();
    config.transcoding.max_concurrent_transcodes = workers;
    config.auth.tokens = vec![
        grant(ADMIN_TOKEN, "admin", true, None),
        grant(LISTENER_TOKEN, "listener", true, Some(&[BOOK][..])),
        grant(NO_DOWNLOAD_TOKEN, "guest", false, None),
    ];

    let transcoder = Arc::new(transcoder);
    let engine = Arc::new(TranscodeEngine::new(
        EngineConfig {
            cache_root: cache,
            worker_count: workers,
            job_timeout: Duration::from_secs(30),
        },
        transcoder.clone(),
    ));
    let verifier = StaticTokenVerifier::new(&config.auth.tokens);

    let state = AppState::new(
        Arc::new(config),
        Arc::new(catalog),
        engine,
        Arc::new(verifier),
    );
    let server = TestServer::new(create_router(state.clone())).expect("test server");

    TestApp {
        server,
        state,
        transcoder,
        dir,
    }
}

fn source(
    id: &str,
    book_id: &str,
    path: PathBuf,
    codec: &str,
    container: &str,
    channels: u16,
) -> AudioSource {
    AudioSource {
        id: id.into(),
        book_id: book_id.into(),
        path,
        codec: codec.into(),
        container: container.into(),
        duration_ms: 60_000,
        size_bytes: 1000,
        bitrate: 128_000,
        channels,
    }
}

fn grant(token: &str, user: &str, can_download: bool, books: Option<&[&str]>) -> TokenGrant {
    TokenGrant {
        token: token.into(),
        user_id: user.into(),
        can_download,
        books: books.map(|b| b.iter().map(|s| s.to_string()).collect()),
    }
}

/// Poll the engine until the job leaves pending/running.
pub async fn wait_for_terminal(state: &AppState, id: uuid::Uuid) -> tomecast_core::TranscodeJob {
    for _ in 0..500 {
        let job = state.engine.get_job(id).expect("job exists");
        if job.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not finish");
}
