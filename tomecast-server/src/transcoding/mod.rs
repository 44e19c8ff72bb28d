//! Transcode job engine.
//!
//! [`TranscodeEngine`] deduplicates requests per `(source, variant)`, queues
//! them by priority, and runs them on a bounded pool of workers that invoke
//! a [`Transcoder`]. All bookkeeping lives in one mutex-guarded
//! job table that is never held across an `.await`.

pub mod cache;
pub mod ffmpeg;
pub mod job;
pub(crate) mod queue;
pub mod transcoder;
mod worker;

pub use cache::{CacheLayout, CacheSidecar};
pub use ffmpeg::FfmpegTranscoder;
pub use job::{EngineError, EngineStats, JobRequest};
pub use transcoder::{ProgressSink, TranscodeError, Transcoder};

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tomecast_core::{JobKey, TranscodeJob};

use queue::JobTable;
use worker::WorkerPool;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache_root: PathBuf,
    pub worker_count: usize,
    pub job_timeout: Duration,
}

/// State shared between the engine handle and its workers.
pub(crate) struct EngineShared {
    table: Mutex<JobTable>,
    cache: CacheLayout,
    transcoder: Arc<dyn Transcoder>,
    pub(crate) notify: Notify,
    job_timeout: Duration,
}

pub struct TranscodeEngine {
    shared: Arc<EngineShared>,
    pool: WorkerPool,
}

impl std::fmt::Debug for TranscodeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeEngine")
            .field("cache_root", &self.shared.cache.root())
            .field("job_timeout", &self.shared.job_timeout)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl TranscodeEngine {
    /// Build the engine and start its workers. Must be called inside a
    /// tokio runtime.
    pub fn new(config: EngineConfig, transcoder: Arc<dyn Transcoder>) -> Self {
        let shared = Arc::new(EngineShared {
            table: Mutex::new(JobTable::default()),
            cache: CacheLayout::new(config.cache_root),
            transcoder,
            notify: Notify::new(),
            job_timeout: config.job_timeout,
        });
        let pool = WorkerPool::start(config.worker_count.max(1), shared.clone());
        Self { shared, pool }
    }

    pub fn cache(&self) -> &CacheLayout {
        &self.shared.cache
    }

    /// Return the job backing `request`'s key, creating one if needed.
    ///
    /// A pending or running job is returned as is, without raising its
    /// priority. A failure is returned once to each caller that asked for
    /// the failed job and has not seen the outcome yet; every other call
    /// queues a fresh job. A completed job is returned while its manifest
    /// exists. Output on disk with no job in memory is adopted as a
    /// completed job only when its sidecar matches the key, so a manifest
    /// left behind by an interrupted run is transcoded again. Otherwise a
    /// new pending job is queued.
    pub async fn create_or_get_job(&self, request: JobRequest) -> Result<TranscodeJob, EngineError> {
        let key = request.key();
        let output_dir = self.shared.cache.output_dir(&key);

        let candidate = {
            let mut table = self.shared.table.lock();
            if let Some(job) = table.join_live(&key, &request.requested_by) {
                return Ok(job);
            }
            if let Some(job) = table.take_failed(&key, &request.requested_by) {
                return Ok(job);
            }
            table.completed(&key).map(|job| job.id)
        };

        // Disk checks happen outside the lock; the decision below re-reads
        // the table so concurrent callers still agree on one job.
        let manifest_present = self.shared.cache.has_valid_manifest(&output_dir).await;
        let sidecar = if candidate.is_none() && manifest_present {
            self.shared
                .cache
                .read_sidecar(&output_dir)
                .await
                .ok()
                .filter(|sidecar| sidecar.key() == key)
        } else {
            None
        };

        let mut table = self.shared.table.lock();
        if let Some(job) = table.join_live(&key, &request.requested_by) {
            return Ok(job);
        }
        if let Some(job) = table.take_failed(&key, &request.requested_by) {
            return Ok(job);
        }

        if let Some(job) = table.completed(&key) {
            // A different id means a worker finished this key after our
            // disk check, so its manifest was just validated.
            if manifest_present || candidate != Some(job.id) {
                return Ok(job.clone());
            }
            info!(job_id = %job.id, key = %key, "cached output vanished, transcoding again");
            table.forget_completed(&key);
        } else if let Some(sidecar) = sidecar {
            let job = recovered_job(&request, &output_dir, &sidecar);
            info!(job_id = %job.id, key = %key, "adopted cached transcode output");
            return Ok(table.adopt_completed(job));
        } else if manifest_present {
            warn!(key = %key, dir = %output_dir.display(), "cached manifest has no sidecar, transcoding again");
        }

        let job = table.enqueue(
            TranscodeJob::new(
                request.source_audio_id,
                request.source_path,
                request.source_codec,
                request.variant,
                request.priority,
            )
            .with_book(request.book_id),
            &request.requested_by,
        );
        drop(table);

        info!(job_id = %job.id, key = %key, priority = job.priority, "queued transcode job");
        self.shared.notify.notify_one();
        Ok(job)
    }

    pub fn get_job(&self, id: Uuid) -> Result<TranscodeJob, EngineError> {
        self.shared
            .table
            .lock()
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    /// The job currently associated with `key`: live first, then completed.
    pub fn find_job(&self, key: &JobKey) -> Option<TranscodeJob> {
        let table = self.shared.table.lock();
        table.live(key).or_else(|| table.completed(key)).cloned()
    }

    /// `requester` saw job `id` fail, so its next request retries instead
    /// of being told about the failure again.
    pub fn acknowledge_failure(&self, id: Uuid, requester: &str) {
        self.shared.table.lock().acknowledge_failure(&id, requester);
    }

    /// Change the priority of a job that has not started yet.
    pub fn reprioritize(&self, id: Uuid, priority: i32) -> Result<TranscodeJob, EngineError> {
        let job = self.shared.table.lock().reprioritize(id, priority)?;
        debug!(job_id = %id, priority, "reprioritized transcode job");
        Ok(job)
    }

    pub fn stats(&self) -> EngineStats {
        self.shared.table.lock().stats()
    }

    /// Adopt every valid cached variant that has no job in memory.
    /// Returns the number of variants adopted.
    pub async fn reconcile_cache(&self) -> Result<usize, EngineError> {
        let found = self.shared.cache.scan().await?;
        let mut table = self.shared.table.lock();
        let mut adopted = 0;

        for (output_dir, sidecar) in found {
            let key = sidecar.key();
            if table.live(&key).is_some() || table.completed(&key).is_some() {
                continue;
            }
            let mut job = TranscodeJob::new(
                sidecar.source_audio_id.clone(),
                sidecar.source_path.clone(),
                sidecar.source_codec.clone(),
                sidecar.variant,
                0,
            )
            .with_book(sidecar.book_id.clone());
            job.id = sidecar.job_id;
            job.mark_running(output_dir);
            job.mark_completed();
            table.adopt_completed(job);
            adopted += 1;
        }

        info!(adopted, root = %self.shared.cache.root().display(), "reconciled transcode cache");
        Ok(adopted)
    }

    /// Stop the worker pool. Jobs already running finish first; pending
    /// jobs stay pending.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

fn recovered_job(request: &JobRequest, output_dir: &Path, sidecar: &CacheSidecar) -> TranscodeJob {
    let mut job = TranscodeJob::new(
        request.source_audio_id.clone(),
        request.source_path.clone(),
        request.source_codec.clone(),
        request.variant,
        request.priority,
    )
    .with_book(request.book_id.clone());
    job.id = sidecar.job_id;
    job.mark_running(output_dir.to_path_buf());
    job.mark_completed();
    job
}

impl EngineShared {
    pub(crate) fn claim_next(&self) -> Option<TranscodeJob> {
        self.table
            .lock()
            .claim_next(|key| self.cache.output_dir(key))
    }

    pub(crate) async fn run_job(self: &Arc<Self>, worker: usize, job: TranscodeJob) {
        let Some(output_dir) = job.output_dir.clone() else {
            error!(job_id = %job.id, "claimed job has no output directory");
            self.table.lock().fail(&job.id, "internal error: no output directory");
            return;
        };

        info!(
            worker,
            job_id = %job.id,
            source = %job.source_path.display(),
            variant = %job.variant,
            "transcode started"
        );

        match self.execute(&job, &output_dir).await {
            Ok(()) => {
                self.table.lock().complete(&job.id);
                info!(worker, job_id = %job.id, "transcode completed");
            }
            Err(err) => {
                // Clean up before the key is freed so a retry never races
                // with this removal.
                if let Err(cleanup) = self.cache.remove_output_dir(&output_dir).await {
                    warn!(job_id = %job.id, error = %cleanup, "failed to remove partial output");
                }
                error!(worker, job_id = %job.id, error = %err, "transcode failed");
                self.table.lock().fail(&job.id, err.to_string());
            }
        }
    }

    async fn execute(
        self: &Arc<Self>,
        job: &TranscodeJob,
        output_dir: &Path,
    ) -> Result<(), TranscodeError> {
        self.cache.prepare_output_dir(output_dir).await?;

        let progress = {
            let shared = Arc::downgrade(self);
            let id = job.id;
            ProgressSink::new(move |percent| {
                if let Some(shared) = shared.upgrade() {
                    shared.table.lock().record_progress(&id, percent);
                }
            })
        };

        let run = self
            .transcoder
            .transcode(&job.source_path, job.variant, output_dir, progress);
        match tokio::time::timeout(self.job_timeout, run).await {
            Ok(result) => result?,
            Err(_) => return Err(TranscodeError::Timeout(self.job_timeout)),
        }

        if !self.cache.has_valid_manifest(output_dir).await {
            return Err(TranscodeError::MissingOutput(CacheLayout::manifest_path(
                output_dir,
            )));
        }

        self.cache
            .write_sidecar(output_dir, &CacheSidecar::from_job(job))
            .await?;
        Ok(())
    }
}
