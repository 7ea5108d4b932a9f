//! Monitoring event vocabulary shared by the dashboard and analytics queries.

use serde::{Deserialize, Serialize};

/// `event_type` recorded by the reporting collaborator for a failed run.
pub const EXECUTION_FAILED_EVENT: &str = "execution_failed";

/// `status` recorded for a failed run.
pub const FAILED_STATUS: &str = "failed";

/// `status` recorded for a successful run.
const COMPLETED_STATUS: &str = "completed";

/// Dashboard classification of a monitoring event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    /// The run completed.
    Success,
    /// Anything other than `completed`.
    Failed,
}

impl ActivityKind {
    /// Classify an event by its status. Only `completed` counts as success.
    pub fn from_status(status: &str) -> Self {
        if status == COMPLETED_STATUS {
            Self::Success
        } else {
            Self::Failed
        }
    }
}
