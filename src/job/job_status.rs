use log::warn;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a row in the `tree_jobs` table, stored as an integer.
#[repr(i64)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending = 0,   // Recorded, waiting for a worker
    Running = 1,   // A worker is walking the subtree
    Completed = 2, // Every node in the subtree was processed
    Error = 3,     // The job aborted, or at least one node failed
}

impl JobStatus {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => JobStatus::Pending,
            1 => JobStatus::Running,
            2 => JobStatus::Completed,
            3 => JobStatus::Error,
            _ => {
                warn!(
                    "Invalid JobStatus value in database: {}, defaulting to Error",
                    value
                );
                JobStatus::Error
            }
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Running => "Running",
            JobStatus::Completed => "Completed",
            JobStatus::Error => "Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}
