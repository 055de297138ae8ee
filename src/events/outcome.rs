use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Terminal result of one batch submission attempt.
///
/// Exactly one outcome is published per batch, whether the write succeeded,
/// failed, or was cancelled at shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub batch_id: Uuid,

    /// Close order of the batch, starting at 0
    pub sequence: u64,

    pub success: bool,

    /// Wall clock time at which the attempt completed
    pub timestamp: DateTime<Utc>,

    pub line_count: usize,

    /// Payload size in bytes
    pub bytes_sent: usize,

    /// Response body size in bytes (0 on failure)
    pub bytes_received: usize,

    /// HTTP status when the transport reported one
    pub status_code: Option<u16>,

    /// Failure description (None on success)
    pub error: Option<String>,

    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl SubmissionOutcome {
    pub fn is_failure(&self) -> bool {
        !self.success
    }
}
