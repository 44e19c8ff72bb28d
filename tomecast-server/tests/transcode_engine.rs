use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use tomecast_core::{JobKey, JobStatus, TranscodeJob, TranscodeVariant};
use tomecast_server::transcoding::{EngineConfig, EngineError, JobRequest, TranscodeEngine};

#[path = "support/mod.rs"]
mod support;
use support::FakeTranscoder;

fn engine(transcoder: Arc<FakeTranscoder>, workers: usize, root: &Path) -> Arc<TranscodeEngine> {
    engine_with_timeout(transcoder, workers, root, Duration::from_secs(30))
}

fn engine_with_timeout(
    transcoder: Arc<FakeTranscoder>,
    workers: usize,
    root: &Path,
    job_timeout: Duration,
) -> Arc<TranscodeEngine> {
    Arc::new(TranscodeEngine::new(
        EngineConfig {
            cache_root: root.to_path_buf(),
            worker_count: workers,
            job_timeout,
        },
        transcoder,
    ))
}

fn request(id: &str, variant: TranscodeVariant, priority: i32) -> JobRequest {
    JobRequest {
        book_id: "b1".to_string(),
        source_audio_id: id.to_string(),
        source_path: PathBuf::from(format!("/library/{id}.ac4")),
        source_codec: "ac4".to_string(),
        variant,
        priority,
        requested_by: "tester".to_string(),
    }
}

async fn wait_until(engine: &TranscodeEngine, id: Uuid, done: impl Fn(&TranscodeJob) -> bool) -> TranscodeJob {
    for _ in 0..500 {
        let job = engine.get_job(id).unwrap();
        if done(&job) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached the expected state");
}

async fn wait_terminal(engine: &TranscodeEngine, id: Uuid) -> TranscodeJob {
    wait_until(engine, id, TranscodeJob::is_terminal).await
}

async fn wait_running(engine: &TranscodeEngine, id: Uuid) -> TranscodeJob {
    wait_until(engine, id, |job| job.status == JobStatus::Running).await
}

fn started_ids(transcoder: &FakeTranscoder) -> Vec<String> {
    transcoder
        .started
        .lock()
        .iter()
        .map(|(path, _)| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect()
}

#[tokio::test]
async fn concurrent_requests_share_one_job() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let transcoder = Arc::new(FakeTranscoder::gated(gate.clone()));
    let engine = engine(transcoder.clone(), 4, dir.path());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
                    .await
                    .unwrap()
                    .id
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "all callers must see the same job");

    gate.add_permits(1);
    let job = wait_terminal(&engine, ids[0]).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(transcoder.calls(), 1);
    assert_eq!(engine.stats().total, 1);
}

#[tokio::test]
async fn variants_are_scheduled_and_stored_separately() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = Arc::new(FakeTranscoder::default());
    let engine = engine(transcoder.clone(), 2, dir.path());

    let stereo = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    let spatial = engine
        .create_or_get_job(request("a1", TranscodeVariant::Spatial, 0))
        .await
        .unwrap();
    assert_ne!(stereo.id, spatial.id);

    let stereo = wait_terminal(&engine, stereo.id).await;
    let spatial = wait_terminal(&engine, spatial.id).await;
    assert_eq!(stereo.status, JobStatus::Completed);
    assert_eq!(spatial.status, JobStatus::Completed);
    assert_ne!(stereo.output_dir, spatial.output_dir);
    assert_eq!(transcoder.calls(), 2);
}

#[tokio::test]
async fn completed_job_is_reused_without_transcoding_again() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = Arc::new(FakeTranscoder::default());
    let engine = engine(transcoder.clone(), 1, dir.path());

    let first = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    wait_terminal(&engine, first.id).await;

    let again = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.status, JobStatus::Completed);
    assert_eq!(again.progress, 100);
    assert_eq!(transcoder.calls(), 1);

    let output_dir = again.output_dir.unwrap();
    assert!(output_dir.join("playlist.m3u8").is_file());
    assert!(output_dir.join("job.json").is_file());
}

#[tokio::test]
async fn failed_job_is_cleaned_up_and_retried_with_new_id() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = Arc::new(FakeTranscoder::default());
    transcoder.fail_next("Invalid data found when processing input");
    let engine = engine(transcoder.clone(), 1, dir.path());

    let first = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    let failed = wait_terminal(&engine, first.id).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(
        failed
            .error
            .as_deref()
            .unwrap()
            .contains("Invalid data found when processing input")
    );
    assert!(!failed.output_dir.unwrap().exists(), "partial output removed");

    // The next caller is told about the failure once.
    let reported = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    assert_eq!(reported.id, first.id);
    assert_eq!(reported.status, JobStatus::Failed);

    let retry = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    assert_ne!(retry.id, first.id);
    assert_eq!(wait_terminal(&engine, retry.id).await.status, JobStatus::Completed);
    assert_eq!(transcoder.calls(), 2);

    // The failed record stays queryable.
    assert_eq!(engine.get_job(first.id).unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn failure_is_only_reported_to_callers_that_asked_for_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = Arc::new(FakeTranscoder::default());
    transcoder.fail_next("Invalid data found when processing input");
    let engine = engine(transcoder.clone(), 1, dir.path());

    let first = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    assert_eq!(wait_terminal(&engine, first.id).await.status, JobStatus::Failed);

    let other = engine
        .create_or_get_job(JobRequest {
            requested_by: "someone-else".to_string(),
            ..request("a1", TranscodeVariant::Stereo, 0)
        })
        .await
        .unwrap();
    assert_ne!(other.id, first.id, "a caller that never asked gets a retry");
    assert_eq!(wait_terminal(&engine, other.id).await.status, JobStatus::Completed);

    // The retry replaced the failure, so the original caller reuses it.
    let original = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    assert_eq!(original.id, other.id);
    assert_eq!(transcoder.calls(), 2);
}

#[tokio::test]
async fn acknowledged_failure_is_retried_on_next_request() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = Arc::new(FakeTranscoder::default());
    transcoder.fail_next("boom");
    let engine = engine(transcoder.clone(), 1, dir.path());

    let first = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    assert_eq!(wait_terminal(&engine, first.id).await.status, JobStatus::Failed);
    engine.acknowledge_failure(first.id, "tester");

    let retry = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    assert_ne!(retry.id, first.id);
    assert_eq!(wait_terminal(&engine, retry.id).await.status, JobStatus::Completed);
}

#[tokio::test]
async fn timed_out_job_fails() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let transcoder = Arc::new(FakeTranscoder::gated(gate));
    let engine = engine_with_timeout(transcoder, 1, dir.path(), Duration::from_millis(50));

    let job = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    let job = wait_terminal(&engine, job.id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn pending_jobs_run_by_priority_then_arrival() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let transcoder = Arc::new(FakeTranscoder::gated(gate.clone()));
    let engine = engine(transcoder.clone(), 1, dir.path());

    let blocker = engine
        .create_or_get_job(request("blocker", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    wait_running(&engine, blocker.id).await;

    let mut ids = Vec::new();
    for (name, priority) in [("low", 1), ("high-first", 5), ("high-second", 5), ("mid", 3)] {
        ids.push(
            engine
                .create_or_get_job(request(name, TranscodeVariant::Stereo, priority))
                .await
                .unwrap()
                .id,
        );
    }

    gate.add_permits(5);
    for id in ids {
        wait_terminal(&engine, id).await;
    }

    assert_eq!(
        started_ids(&transcoder),
        ["blocker", "high-first", "high-second", "mid", "low"]
    );
}

#[tokio::test]
async fn reprioritize_only_affects_pending_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let transcoder = Arc::new(FakeTranscoder::gated(gate.clone()));
    let engine = engine(transcoder.clone(), 1, dir.path());

    let running = engine
        .create_or_get_job(request("running", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    wait_running(&engine, running.id).await;

    let first = engine
        .create_or_get_job(request("first", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    let second = engine
        .create_or_get_job(request("second", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();

    // A duplicate request does not raise priority.
    let duplicate = engine
        .create_or_get_job(request("second", TranscodeVariant::Stereo, 50))
        .await
        .unwrap();
    assert_eq!(duplicate.id, second.id);
    assert_eq!(duplicate.priority, 0);

    let bumped = engine.reprioritize(second.id, 10).unwrap();
    assert_eq!(bumped.priority, 10);

    assert!(matches!(
        engine.reprioritize(running.id, 10),
        Err(EngineError::InvalidState {
            status: JobStatus::Running,
            ..
        })
    ));
    assert!(matches!(
        engine.reprioritize(Uuid::new_v4(), 10),
        Err(EngineError::NotFound(_))
    ));

    gate.add_permits(3);
    wait_terminal(&engine, first.id).await;
    wait_terminal(&engine, second.id).await;
    assert_eq!(started_ids(&transcoder), ["running", "second", "first"]);
}

#[tokio::test]
async fn progress_never_decreases() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let transcoder = Arc::new(FakeTranscoder::gated(gate.clone()));
    let engine = engine(transcoder, 1, dir.path());

    let job = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    let running = wait_until(&engine, job.id, |job| job.progress >= 60).await;
    assert_eq!(running.status, JobStatus::Running);
    assert!(running.progress < 100);

    let mut observed = vec![running.progress];
    gate.add_permits(1);
    loop {
        let job = engine.get_job(job.id).unwrap();
        observed.push(job.progress);
        if job.is_terminal() {
            assert_eq!(job.status, JobStatus::Completed);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(observed.windows(2).all(|pair| pair[0] <= pair[1]), "{observed:?}");
    assert_eq!(observed.last(), Some(&100));
}

#[tokio::test]
async fn vanished_manifest_triggers_new_job() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = Arc::new(FakeTranscoder::default());
    let engine = engine(transcoder.clone(), 1, dir.path());

    let first = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    let first = wait_terminal(&engine, first.id).await;
    let output_dir = first.output_dir.clone().unwrap();
    tokio::fs::remove_file(output_dir.join("playlist.m3u8"))
        .await
        .unwrap();

    let second = engine
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(wait_terminal(&engine, second.id).await.status, JobStatus::Completed);
    assert_eq!(transcoder.calls(), 2);
    assert!(output_dir.join("playlist.m3u8").is_file());
}

#[tokio::test]
async fn restart_recovers_completed_variants_from_disk() {
    let dir = tempfile::tempdir().unwrap();

    let first_run = Arc::new(FakeTranscoder::default());
    let engine_a = engine(first_run.clone(), 1, dir.path());
    let original = engine_a
        .create_or_get_job(request("a1", TranscodeVariant::Spatial, 0))
        .await
        .unwrap();
    wait_terminal(&engine_a, original.id).await;
    engine_a.shutdown().await;

    let second_run = Arc::new(FakeTranscoder::default());
    let engine_b = engine(second_run.clone(), 1, dir.path());
    assert_eq!(engine_b.reconcile_cache().await.unwrap(), 1);
    assert_eq!(engine_b.reconcile_cache().await.unwrap(), 0, "already adopted");

    let found = engine_b
        .find_job(&JobKey::new("a1", TranscodeVariant::Spatial))
        .unwrap();
    assert_eq!(found.id, original.id);
    assert_eq!(found.status, JobStatus::Completed);

    let reused = engine_b
        .create_or_get_job(request("a1", TranscodeVariant::Spatial, 0))
        .await
        .unwrap();
    assert_eq!(reused.id, original.id);
    assert_eq!(second_run.calls(), 0);
}

#[tokio::test]
async fn cached_output_is_adopted_lazily_without_reconcile() {
    let dir = tempfile::tempdir().unwrap();

    let engine_a = engine(Arc::new(FakeTranscoder::default()), 1, dir.path());
    let original = engine_a
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    wait_terminal(&engine_a, original.id).await;
    engine_a.shutdown().await;

    let second_run = Arc::new(FakeTranscoder::default());
    let engine_b = engine(second_run.clone(), 1, dir.path());
    let adopted = engine_b
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();

    assert_eq!(adopted.status, JobStatus::Completed);
    assert_eq!(adopted.id, original.id);
    assert_eq!(second_run.calls(), 0);
}

#[tokio::test]
async fn manifest_without_sidecar_is_transcoded_again() {
    let dir = tempfile::tempdir().unwrap();

    let engine_a = engine(Arc::new(FakeTranscoder::default()), 1, dir.path());
    let original = engine_a
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    let original = wait_terminal(&engine_a, original.id).await;
    engine_a.shutdown().await;

    // An interrupted run leaves a manifest but never writes the sidecar.
    let output_dir = original.output_dir.unwrap();
    tokio::fs::remove_file(output_dir.join("job.json")).await.unwrap();
    assert!(output_dir.join("playlist.m3u8").is_file());

    let second_run = Arc::new(FakeTranscoder::default());
    let engine_b = engine(second_run.clone(), 1, dir.path());
    let job = engine_b
        .create_or_get_job(request("a1", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Pending);
    assert_ne!(job.id, original.id);
    assert_eq!(wait_terminal(&engine_b, job.id).await.status, JobStatus::Completed);
    assert_eq!(second_run.calls(), 1);
    assert!(output_dir.join("job.json").is_file());
}

#[tokio::test]
async fn shutdown_drains_running_jobs_and_leaves_pending() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let transcoder = Arc::new(FakeTranscoder::gated(gate.clone()));
    let engine = engine(transcoder.clone(), 1, dir.path());

    let running = engine
        .create_or_get_job(request("running", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();
    wait_running(&engine, running.id).await;
    let waiting = engine
        .create_or_get_job(request("waiting", TranscodeVariant::Stereo, 0))
        .await
        .unwrap();

    let stopper = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.shutdown().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopper.is_finished(), "shutdown waits for the running job");

    gate.add_permits(2);
    tokio::time::timeout(Duration::from_secs(5), stopper)
        .await
        .expect("shutdown finished")
        .unwrap();

    assert_eq!(engine.get_job(running.id).unwrap().status, JobStatus::Completed);
    assert_eq!(engine.get_job(waiting.id).unwrap().status, JobStatus::Pending);
    assert_eq!(transcoder.calls(), 1);
}
