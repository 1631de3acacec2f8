/// Upstream job lifecycle as seen by one refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Processing,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Submitted => "submitted",
            JobState::Processing => "processing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }
}

/// Balance fetch job. Lives only for one refresh cycle, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub job_id: String,
    /// assigned by upstream once the result is available
    pub result_id: Option<String>,
    pub state: JobState,
    /// upstream explanation when `state == Failed`
    pub failure: Option<String>,
}

impl FetchJob {
    pub fn submitted(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            result_id: None,
            state: JobState::Submitted,
            failure: None,
        }
    }
}
