//! The queue state machine.
//!
//! Glues the store and the scheduler decisions together and enforces legal
//! job transitions. Every state mutation of a claimed job happens while the
//! caller holds that job's advisory lock, so at most one worker ever drives
//! a given job through an attempt.

use std::path::Path;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::queue::job::{Job, JobSpec, JobState};
use crate::scheduler;
use crate::store::{FileLock, Store};

/// A job claimed for execution. Holds the job's exclusive lock; the lock is
/// released when the claim is consumed by `mark_succeeded`/`mark_failed`
/// (or dropped, including on panic).
#[derive(Debug)]
pub struct ClaimedJob {
    pub job: Job,
    _lock: FileLock,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilter {
    pub state: Option<JobState>,
    pub limit: Option<usize>,
}

/// Per-state job counts across the active set plus the DLQ size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead: usize,
    pub total: usize,
}

pub struct JobQueue {
    store: Store,
    clock: Arc<dyn Clock>,
}

impl JobQueue {
    pub fn new(store: Store, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Open a queue over `root` with the system clock.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(
            Store::open(root.as_ref().to_path_buf())?,
            Arc::new(SystemClock),
        ))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Validate a spec, fill defaults from config, and persist the job as
    /// pending.
    pub fn enqueue(&self, spec: JobSpec) -> Result<Job> {
        spec.validate()?;
        let config = self.store.load_config()?;
        let job = Job::from_spec(spec, config.max_retries, self.clock.now());
        self.store.add(&job)?;
        tracing::info!(job_id = %job.id, command = %job.command, "Job enqueued");
        Ok(job)
    }

    /// Claim the oldest eligible job, or `None` when nothing is claimable.
    ///
    /// Candidates are taken from a snapshot ordered by `created_at` (id as
    /// tie-break). For each, the job lock is tried without blocking; jobs
    /// another worker holds are skipped. The snapshot may be stale by the
    /// time the lock is held, so claimability is re-checked against a fresh
    /// read before the transition to `processing` is persisted.
    pub fn claim_next(&self) -> Result<Option<ClaimedJob>> {
        let now = self.clock.now();
        let mut candidates: Vec<Job> = self
            .store
            .load_active()?
            .into_iter()
            .filter(|job| scheduler::is_claimable(job, now))
            .collect();
        candidates.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        for candidate in candidates {
            let Some(lock) = self.store.try_lock(&candidate.id)? else {
                continue;
            };
            let Some(mut job) = self.store.get(&candidate.id)? else {
                continue;
            };
            if !scheduler::is_claimable(&job, self.clock.now()) {
                continue;
            }

            job.state = JobState::Processing;
            job.updated_at = self.clock.now();
            self.store.update(&job)?;
            tracing::debug!(job_id = %job.id, "Job claimed");
            return Ok(Some(ClaimedJob { job, _lock: lock }));
        }

        Ok(None)
    }

    /// Settle a successful attempt: the job completes and stays in the
    /// active set.
    pub fn mark_succeeded(&self, claimed: ClaimedJob) -> Result<Job> {
        let ClaimedJob { mut job, _lock } = claimed;
        job.attempts += 1;
        job.state = JobState::Completed;
        job.next_retry_at = None;
        job.error_message = None;
        job.updated_at = self.clock.now();
        self.store.update(&job)?;
        tracing::info!(job_id = %job.id, attempts = job.attempts, "Job completed");
        Ok(job)
    }

    /// Settle a failed attempt: either schedule a retry with backoff or
    /// retire the job to the dead letter queue.
    pub fn mark_failed(&self, claimed: ClaimedJob, error: impl Into<String>) -> Result<Job> {
        let ClaimedJob { mut job, _lock } = claimed;
        let config = self.store.load_config()?;
        job.attempts += 1;
        job.error_message = Some(error.into());
        job.updated_at = self.clock.now();

        if scheduler::should_retire(&job) {
            job.state = JobState::Dead;
            job.next_retry_at = None;
            self.store.move_to_dlq(&job)?;
            tracing::warn!(
                job_id = %job.id,
                attempts = job.attempts,
                "Job retired to dead letter queue"
            );
        } else {
            let delay = scheduler::retry_delay(&config, job.attempts);
            job.next_retry_at = Some(job.updated_at + delay);
            job.state = JobState::Pending;
            self.store.update(&job)?;
            tracing::info!(
                job_id = %job.id,
                attempts = job.attempts,
                retry_in_ms = delay.num_milliseconds(),
                "Job scheduled for retry"
            );
        }
        Ok(job)
    }

    /// Snapshot of the active set, optionally filtered.
    ///
    /// `failed` selects pending jobs with a recorded failure (the state is
    /// never persisted on a settled job); `dead` reads the DLQ.
    pub fn list(&self, filter: ListFilter) -> Result<Vec<Job>> {
        if filter.limit == Some(0) {
            return Err(QueueError::Validation(
                "Limit must be at least 1".to_string(),
            ));
        }
        let jobs: Vec<Job> = match filter.state {
            Some(JobState::Dead) => self.store.load_dlq()?,
            Some(JobState::Failed) => self
                .store
                .load_active()?
                .into_iter()
                .filter(|job| job.state == JobState::Pending && job.error_message.is_some())
                .collect(),
            Some(state) => self
                .store
                .load_active()?
                .into_iter()
                .filter(|job| job.state == state)
                .collect(),
            None => self.store.load_active()?,
        };
        Ok(match filter.limit {
            Some(limit) => jobs.into_iter().take(limit).collect(),
            None => jobs,
        })
    }

    pub fn stats(&self) -> Result<QueueStats> {
        let jobs = self.store.load_active()?;
        let dlq = self.store.load_dlq()?;

        let mut stats = QueueStats {
            dead: dlq.len(),
            total: jobs.len() + dlq.len(),
            ..QueueStats::default()
        };
        for job in &jobs {
            match job.state {
                JobState::Pending => stats.pending += 1,
                JobState::Processing => stats.processing += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Dead => {}
            }
        }
        Ok(stats)
    }

    pub fn dlq_list(&self, limit: Option<usize>) -> Result<Vec<Job>> {
        self.list(ListFilter {
            state: Some(JobState::Dead),
            limit,
        })
    }

    /// Move a dead job back into the active set with a fresh attempt budget.
    pub fn dlq_requeue(&self, id: &str) -> Result<Job> {
        let job = self.store.requeue_from_dlq(id, self.clock.now())?;
        tracing::info!(job_id = %id, "Job requeued from dead letter queue");
        Ok(job)
    }

    pub fn config(&self) -> Result<QueueConfig> {
        self.store.load_config()
    }

    pub fn update_config(&self, key: &str, value: &str) -> Result<QueueConfig> {
        let mut config = self.store.load_config()?;
        config.set(key, value)?;
        self.store.save_config(&config)?;
        Ok(config)
    }

    /// Reclaim jobs stranded in `processing` by a crashed worker.
    ///
    /// A live worker holds the job's lock for the whole attempt, so a
    /// processing job whose lock is free has no owner. Each such job is
    /// settled as a failed attempt and routed through the normal
    /// retry/retire decision. Returns the number of jobs recovered.
    pub fn recover_stale(&self) -> Result<usize> {
        let stranded: Vec<Job> = self
            .store
            .load_active()?
            .into_iter()
            .filter(|job| job.state == JobState::Processing)
            .collect();

        let mut recovered = 0;
        for job in stranded {
            let Some(lock) = self.store.try_lock(&job.id)? else {
                // A live worker owns this one.
                continue;
            };
            let Some(current) = self.store.get(&job.id)? else {
                continue;
            };
            if current.state != JobState::Processing {
                continue;
            }
            tracing::warn!(job_id = %current.id, "Recovering job abandoned by crashed worker");
            self.mark_failed(
                ClaimedJob {
                    job: current,
                    _lock: lock,
                },
                "worker crashed",
            )?;
            recovered += 1;
        }
        Ok(recovered)
    }
}
