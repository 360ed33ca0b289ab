//! Durable job storage under a single root directory.
//!
//! Layout:
//!
//! ```text
//! <root>/jobs.json        active set (pending/processing/completed)
//! <root>/dlq.json         dead letter queue
//! <root>/config.json      queue configuration
//! <root>/locks/<id>.lock  per-job advisory lock
//! <root>/locks/.root.lock serializes structural collection edits
//! ```
//!
//! Every write goes to a `.tmp` sibling and is renamed over the target, so
//! concurrent readers observe either the old or the new document, never a
//! torn one. Structural operations (`add`, `update`, `move_to_dlq`,
//! `requeue_from_dlq`) are read-modify-write cycles on whole collections and
//! run under the root lock; field-level mutations of a claimed job are
//! additionally covered by that job's own lock, held by the claimer.

pub mod lock;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::queue::job::{Job, JobState};

pub use lock::FileLock;

const JOBS_FILE: &str = "jobs.json";
const DLQ_FILE: &str = "dlq.json";
const CONFIG_FILE: &str = "config.json";
const LOCKS_DIR: &str = "locks";
const ROOT_LOCK: &str = ".root.lock";

/// File-backed store shared by every process working on the same root.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    locks_dir: PathBuf,
}

impl Store {
    /// Open (and create if needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let locks_dir = root.join(LOCKS_DIR);
        fs::create_dir_all(&locks_dir)?;
        Ok(Self { root, locks_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load_active(&self) -> Result<Vec<Job>> {
        self.read_document(&self.root.join(JOBS_FILE))
            .map(Option::unwrap_or_default)
    }

    pub fn load_dlq(&self) -> Result<Vec<Job>> {
        self.read_document(&self.root.join(DLQ_FILE))
            .map(Option::unwrap_or_default)
    }

    pub fn load_config(&self) -> Result<QueueConfig> {
        self.read_document(&self.root.join(CONFIG_FILE))
            .map(Option::unwrap_or_default)
    }

    pub fn save_active(&self, jobs: &[Job]) -> Result<()> {
        self.write_document(&self.root.join(JOBS_FILE), &jobs)
    }

    pub fn save_dlq(&self, jobs: &[Job]) -> Result<()> {
        self.write_document(&self.root.join(DLQ_FILE), &jobs)
    }

    pub fn save_config(&self, config: &QueueConfig) -> Result<()> {
        self.write_document(&self.root.join(CONFIG_FILE), config)
    }

    /// Look up a job in the active set.
    pub fn get(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.load_active()?.into_iter().find(|job| job.id == id))
    }

    /// Append a new job to the active set. The id must be unused across both
    /// the active set and the dead letter queue.
    pub fn add(&self, job: &Job) -> Result<()> {
        let _root = self.lock_root()?;
        let mut jobs = self.load_active()?;
        if jobs.iter().any(|existing| existing.id == job.id)
            || self.load_dlq()?.iter().any(|dead| dead.id == job.id)
        {
            return Err(QueueError::DuplicateId(job.id.clone()));
        }
        jobs.push(job.clone());
        self.save_active(&jobs)
    }

    /// Replace a job in the active set by id.
    pub fn update(&self, job: &Job) -> Result<()> {
        let _root = self.lock_root()?;
        let mut jobs = self.load_active()?;
        let slot = jobs
            .iter_mut()
            .find(|existing| existing.id == job.id)
            .ok_or_else(|| QueueError::NotFound(job.id.clone()))?;
        *slot = job.clone();
        self.save_active(&jobs)
    }

    /// Retire a job: remove it from the active set and append it to the dead
    /// letter queue with `state = dead`. One logical operation under the
    /// root lock.
    pub fn move_to_dlq(&self, job: &Job) -> Result<()> {
        let _root = self.lock_root()?;
        let mut jobs = self.load_active()?;
        let position = jobs
            .iter()
            .position(|existing| existing.id == job.id)
            .ok_or_else(|| QueueError::NotFound(job.id.clone()))?;
        jobs.remove(position);

        let mut dead = job.clone();
        dead.state = JobState::Dead;

        self.save_active(&jobs)?;
        let mut dlq = self.load_dlq()?;
        dlq.push(dead);
        self.save_dlq(&dlq)
    }

    /// Re-admit a dead job: remove it from the DLQ and append it to the
    /// active set as a fresh pending job. History fields are reset but
    /// `created_at` is preserved so the job keeps its position in FIFO
    /// ordering.
    pub fn requeue_from_dlq(&self, id: &str, now: DateTime<Utc>) -> Result<Job> {
        let _root = self.lock_root()?;
        let mut dlq = self.load_dlq()?;
        let position = dlq
            .iter()
            .position(|dead| dead.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        let mut jobs = self.load_active()?;
        if jobs.iter().any(|existing| existing.id == id) {
            return Err(QueueError::DuplicateId(id.to_string()));
        }

        let mut job = dlq.remove(position);
        job.state = JobState::Pending;
        job.attempts = 0;
        job.next_retry_at = None;
        job.error_message = None;
        job.updated_at = now;

        self.save_dlq(&dlq)?;
        jobs.push(job.clone());
        self.save_active(&jobs)?;
        Ok(job)
    }

    /// Try to take a job's exclusive lock without blocking. `None` means
    /// some worker currently owns the job.
    pub fn try_lock(&self, id: &str) -> Result<Option<FileLock>> {
        let path = self.locks_dir.join(format!("{id}.lock"));
        FileLock::try_acquire(&path).map_err(Into::into)
    }

    fn lock_root(&self) -> Result<FileLock> {
        FileLock::acquire(&self.locks_dir.join(ROOT_LOCK)).map_err(Into::into)
    }

    fn read_document<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read_to_string(path) {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write_document<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
