use std::fmt;
use tokio::time::Instant;
use uuid::Uuid;

/// What closed a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseTrigger {
    /// The window reached `max_lines`
    Count,
    /// `max_time` elapsed since the window opened
    Time,
    /// Final window drained at shutdown
    Shutdown,
    /// Windowing bypassed, one line per batch
    Single,
}

impl fmt::Display for CloseTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloseTrigger::Count => "count",
            CloseTrigger::Time => "time",
            CloseTrigger::Shutdown => "shutdown",
            CloseTrigger::Single => "single",
        };
        f.write_str(name)
    }
}

/// Payload of a closed window, ready for exactly one submission.
#[derive(Debug)]
pub struct Batch {
    /// Unique batch ID
    pub batch_id: Uuid,

    /// Monotonic close order, starts at 0
    pub sequence: u64,

    /// Member lines joined with '\n'
    pub payload: String,

    pub line_count: usize,

    pub trigger: CloseTrigger,

    pub opened_at: Instant,

    pub closed_at: Instant,
}

impl Batch {
    pub fn byte_len(&self) -> usize {
        self.payload.len()
    }
}
