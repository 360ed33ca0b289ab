pub mod job;
pub mod service;

pub use job::{Job, JobSpec, JobState};
pub use service::{ClaimedJob, JobQueue, ListFilter, QueueStats};
