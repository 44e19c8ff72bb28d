use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::PathBuf;
use uuid::Uuid;

use tomecast_core::{JobKey, JobStatus, TranscodeJob};

use super::job::{EngineError, EngineStats};

/// Heap entry for a pending job.
#[derive(Debug, Clone)]
struct PriorityJob {
    id: Uuid,
    priority: i32,
    sequence: u64, // For stable ordering of equal priorities
}

impl PartialEq for PriorityJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for PriorityJob {}

impl PartialOrd for PriorityJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier sequence
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

/// Job registry and pending queue.
///
/// `live` maps a key to its single pending or running job, `completed` to the
/// job whose output currently backs that key. A key is never in both.
/// `failed` holds the latest failure per key. `waiting` lists, per job, the
/// requesters that have not been told its outcome yet; a failure is reported
/// to each of them once and never to anyone else.
#[derive(Debug, Default)]
pub(crate) struct JobTable {
    jobs: HashMap<Uuid, TranscodeJob>,
    live: HashMap<JobKey, Uuid>,
    completed: HashMap<JobKey, Uuid>,
    failed: HashMap<JobKey, Uuid>,
    waiting: HashMap<Uuid, HashSet<String>>,
    pending: BinaryHeap<PriorityJob>,
    sequences: HashMap<Uuid, u64>,
    next_sequence: u64,
}

impl JobTable {
    pub fn get(&self, id: &Uuid) -> Option<&TranscodeJob> {
        self.jobs.get(id)
    }

    pub fn live(&self, key: &JobKey) -> Option<&TranscodeJob> {
        self.live.get(key).and_then(|id| self.jobs.get(id))
    }

    pub fn completed(&self, key: &JobKey) -> Option<&TranscodeJob> {
        self.completed.get(key).and_then(|id| self.jobs.get(id))
    }

    /// The failure of `key`, if `requester` asked for that job and has not
    /// been told yet. Each requester gets it once.
    pub fn take_failed(&mut self, key: &JobKey, requester: &str) -> Option<TranscodeJob> {
        let id = *self.failed.get(key)?;
        let waiting = self.waiting.get_mut(&id)?;
        if !waiting.remove(requester) {
            return None;
        }
        if waiting.is_empty() {
            self.clear_failed(key);
        }
        self.jobs.get(&id).cloned()
    }

    /// `requester` has seen the failed job `id` some other way, e.g. by
    /// polling its status.
    pub fn acknowledge_failure(&mut self, id: &Uuid, requester: &str) {
        let Some(key) = self
            .jobs
            .get(id)
            .filter(|job| job.status == JobStatus::Failed)
            .map(TranscodeJob::key)
        else {
            return;
        };
        if let Some(waiting) = self.waiting.get_mut(id) {
            waiting.remove(requester);
            if waiting.is_empty() && self.failed.get(&key) == Some(id) {
                self.clear_failed(&key);
            }
        }
    }

    /// The live job for `key`, with `requester` added to those waiting on it.
    pub fn join_live(&mut self, key: &JobKey, requester: &str) -> Option<TranscodeJob> {
        let id = *self.live.get(key)?;
        self.join(id, requester);
        self.jobs.get(&id).cloned()
    }

    /// Record `requester` as interested in the live job `id`.
    pub fn join(&mut self, id: Uuid, requester: &str) {
        self.waiting
            .entry(id)
            .or_default()
            .insert(requester.to_string());
    }

    fn clear_failed(&mut self, key: &JobKey) {
        if let Some(id) = self.failed.remove(key) {
            self.waiting.remove(&id);
        }
    }

    /// Drop the completed mapping for `key`; the job itself stays queryable.
    pub fn forget_completed(&mut self, key: &JobKey) {
        self.completed.remove(key);
    }

    pub fn enqueue(&mut self, job: TranscodeJob, requester: &str) -> TranscodeJob {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.pending.push(PriorityJob {
            id: job.id,
            priority: job.priority,
            sequence,
        });
        self.sequences.insert(job.id, sequence);
        self.clear_failed(&job.key());
        self.join(job.id, requester);
        self.live.insert(job.key(), job.id);
        self.jobs.insert(job.id, job.clone());
        job
    }

    /// Register an already completed job, e.g. one recovered from disk.
    pub fn adopt_completed(&mut self, job: TranscodeJob) -> TranscodeJob {
        self.clear_failed(&job.key());
        self.completed.insert(job.key(), job.id);
        self.jobs.insert(job.id, job.clone());
        job
    }

    /// Pop the highest priority pending job and mark it running.
    pub fn claim_next(
        &mut self,
        output_dir: impl Fn(&JobKey) -> PathBuf,
    ) -> Option<TranscodeJob> {
        while let Some(entry) = self.pending.pop() {
            self.sequences.remove(&entry.id);
            let Some(job) = self.jobs.get_mut(&entry.id) else {
                continue;
            };
            if job.status != JobStatus::Pending {
                continue;
            }
            let dir = output_dir(&job.key());
            job.mark_running(dir);
            return Some(job.clone());
        }
        None
    }

    pub fn reprioritize(&mut self, id: Uuid, priority: i32) -> Result<TranscodeJob, EngineError> {
        let job = self.jobs.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        if job.status != JobStatus::Pending {
            return Err(EngineError::InvalidState {
                id,
                status: job.status,
            });
        }
        job.priority = priority;
        let snapshot = job.clone();

        let sequence = self.sequences.get(&id).copied().unwrap_or(self.next_sequence);
        self.pending.retain(|entry| entry.id != id);
        self.pending.push(PriorityJob {
            id,
            priority,
            sequence,
        });
        Ok(snapshot)
    }

    pub fn record_progress(&mut self, id: &Uuid, percent: u8) {
        if let Some(job) = self.jobs.get_mut(id) {
            job.record_progress(percent);
        }
    }

    pub fn complete(&mut self, id: &Uuid) -> Option<TranscodeJob> {
        let job = self.jobs.get_mut(id)?;
        job.mark_completed();
        let key = job.key();
        let snapshot = job.clone();
        self.live.remove(&key);
        self.waiting.remove(id);
        self.completed.insert(key, *id);
        Some(snapshot)
    }

    pub fn fail(&mut self, id: &Uuid, error: impl Into<String>) -> Option<TranscodeJob> {
        let job = self.jobs.get_mut(id)?;
        job.mark_failed(error);
        let key = job.key();
        let snapshot = job.clone();
        if self.live.get(&key) == Some(id) {
            self.live.remove(&key);
            self.failed.insert(key, *id);
        }
        Some(snapshot)
    }

    pub fn stats(&self) -> EngineStats {
        let mut stats = EngineStats {
            total: self.jobs.len(),
            ..EngineStats::default()
        };
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}
