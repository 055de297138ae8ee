//! Asynchronous batched writer for InfluxDB line protocol.
//!
//! Callers submit individual lines without blocking; a background scheduler
//! groups them into windows closed by line count or elapsed time, and each
//! window is written with a single request. Outcomes of every write are
//! published on a multicast event bus.

pub mod config;
pub mod events;
pub mod line;
pub mod pipeline;
pub mod transport;
pub mod writer;

pub use config::{load_config, BatchConfig, ConfigError, WriterConfig};
pub use events::{EventBus, OutcomeSubscription, SubmissionOutcome};
pub use line::Line;
pub use pipeline::LineSender;
pub use transport::{HttpTransport, SuccessInfo, Transport, TransportError};
pub use writer::{AsyncWriter, ShutdownReport, WriterError};
