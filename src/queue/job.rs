use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    /// Never persisted on a settled job: a failed attempt resolves straight
    /// into `Pending` (retry scheduled) or `Dead` (retired). Kept as a wire
    /// name so `list --state failed` can select retrying jobs.
    Failed,
    Dead,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Processing => write!(f, "processing"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::Dead => write!(f, "dead"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "dead" => Ok(JobState::Dead),
            _ => Err(QueueError::Validation(format!("Unknown job state: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Caller-supplied job specification, the payload of `enqueue`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl JobSpec {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(QueueError::Validation(
                "Job id must not be empty".to_string(),
            ));
        }
        // Ids double as lock file names under locks/.
        if self.id.contains(['/', '\\']) {
            return Err(QueueError::Validation(
                "Job id must not contain path separators".to_string(),
            ));
        }
        if self.command.trim().is_empty() {
            return Err(QueueError::Validation(
                "Job command must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Job {
    /// Build a fresh pending job from a validated spec.
    pub fn from_spec(spec: JobSpec, default_max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: spec.id,
            command: spec.command,
            state: JobState::Pending,
            attempts: 0,
            max_retries: spec.max_retries.unwrap_or(default_max_retries),
            created_at: now,
            updated_at: now,
            next_retry_at: None,
            error_message: None,
        }
    }
}
