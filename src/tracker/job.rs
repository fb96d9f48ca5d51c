use std::time::Duration;

use serde::Serialize;

use super::state::TrackerState;
use crate::comfy::Outputs;
use crate::error::GenError;

/// Server-side status of a job as last observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Executing { node: Option<String> },
    Succeeded(Outputs),
    Failed(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded(_) | JobStatus::Failed(_))
    }
}

/// How the final status was learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Push,
    Polling,
}

/// Final result of tracking one job. `TimedOut` is client-side only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Succeeded(Outputs),
    Failed(String),
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    /// Covers the whole tracking run, streaming included.
    pub timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackReport {
    pub job_id: String,
    pub status: TrackOutcome,
    /// Every state entered, starting with `Connecting`.
    pub transitions: Vec<TrackerState>,
    /// History queries made while polling. The lookup after a completion
    /// event is not counted.
    pub polls: u32,
    pub strategy: Strategy,
    pub elapsed: Duration,
    pub timeout: Duration,
}

impl TrackReport {
    pub fn final_state(&self) -> Option<TrackerState> {
        self.transitions.last().copied()
    }

    /// Outputs of a successful job, or the matching [`GenError`].
    pub fn outputs(&self) -> Result<&Outputs, GenError> {
        match &self.status {
            TrackOutcome::Succeeded(outputs) => Ok(outputs),
            TrackOutcome::Failed(message) => Err(GenError::Execution {
                job_id: self.job_id.clone(),
                message: message.clone(),
            }),
            TrackOutcome::TimedOut => Err(GenError::TimedOut {
                job_id: self.job_id.clone(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}
