use log::warn;
use serde::{Deserialize, Serialize};

/// What a row in `tree_jobs` does. Stored as an integer.
#[repr(i64)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    CopySubtree = 0,
    DeleteSubtree = 1,
}

impl JobType {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => JobType::CopySubtree,
            1 => JobType::DeleteSubtree,
            _ => {
                // Copy never removes anything, so it is the safe reading of a bad row
                warn!(
                    "Invalid JobType value in database: {}, defaulting to CopySubtree",
                    value
                );
                JobType::CopySubtree
            }
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            JobType::CopySubtree => "Copy Subtree",
            JobType::DeleteSubtree => "Delete Subtree",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}
