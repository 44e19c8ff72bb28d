use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::EngineShared;

/// Fixed set of tasks pulling jobs from the engine's queue.
pub(crate) struct WorkerPool {
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.handles.lock().len())
            .field("stopping", &self.cancel.is_cancelled())
            .finish()
    }
}

impl WorkerPool {
    pub fn start(worker_count: usize, shared: Arc<EngineShared>) -> Self {
        let cancel = CancellationToken::new();
        let handles = (0..worker_count)
            .map(|id| {
                let shared = shared.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { worker_loop(id, shared, cancel).await })
            })
            .collect();

        info!(workers = worker_count, "started transcode workers");

        Self {
            cancel,
            handles: Mutex::new(handles),
        }
    }

    /// Stop claiming new jobs and wait for in-flight ones to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "transcode worker ended abnormally");
            }
        }
        info!("transcode workers stopped");
    }
}

async fn worker_loop(id: usize, shared: Arc<EngineShared>, cancel: CancellationToken) {
    info!(worker = id, "transcode worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if let Some(job) = shared.claim_next() {
            shared.run_job(id, job).await;
            continue;
        }

        // `notify_one` stores a permit when nobody is waiting, so a job
        // queued between `claim_next` and here is not missed.
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.notify.notified() => {}
        }
    }

    info!(worker = id, "transcode worker shutting down");
}
