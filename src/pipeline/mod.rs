pub mod batch;
pub mod channel;
pub mod scheduler;
pub mod submitter;
pub mod window;

pub use batch::{Batch, CloseTrigger};
pub use channel::{ingestion_channel, LineReceiver, LineSender};
pub use scheduler::{run_scheduler, SchedulerStats, WindowScheduler};
pub use submitter::{run_dispatcher, BatchSubmitter, DispatcherStats, CANCELLED_AT_SHUTDOWN};
pub use window::{Window, WindowState};
