//! Pure retry and eligibility decisions.
//!
//! Stateless given a job, a config, and the current instant; the queue
//! service owns all persistence side effects.

use chrono::{DateTime, Duration, Utc};

use crate::config::QueueConfig;
use crate::queue::job::{Job, JobState};

/// Backoff delay before the next retry of a job that has failed `attempts`
/// times: `backoff_base ^ (attempts - 1)` seconds, capped at
/// `backoff_max_delay`. The first failure waits `base^0` = 1 second.
pub fn retry_delay(config: &QueueConfig, attempts: u32) -> Duration {
    let exponent = f64::from(attempts.saturating_sub(1));
    let seconds = config
        .backoff_base
        .powf(exponent)
        .min(config.backoff_max_delay as f64);
    Duration::milliseconds((seconds * 1000.0) as i64)
}

/// Whether a job that just failed has exhausted its retry budget and must
/// move to the dead letter queue. Evaluated after the attempt counter is
/// incremented, so `max_retries = 1` retires on the first failure.
pub fn should_retire(job: &Job) -> bool {
    job.attempts >= job.max_retries
}

/// Whether a worker may claim this job right now.
pub fn is_claimable(job: &Job, now: DateTime<Utc>) -> bool {
    job.state == JobState::Pending && job.next_retry_at.map_or(true, |at| at <= now)
}
