use crate::config::types::WriterConfig;
use crate::config::{validate_config, ConfigError};
use crate::events::{self, EventBus, OutcomeSubscription, SubmissionOutcome};
use crate::line::Line;
use crate::pipeline::{
    ingestion_channel, run_dispatcher, run_scheduler, BatchSubmitter, DispatcherStats,
    LineSender, SchedulerStats,
};
use crate::transport::{HttpTransport, Transport, TransportError};
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("no tokio runtime available; use AsyncWriter::start_on with an explicit handle")]
    NoRuntime,
}

/// Totals gathered from the background tasks at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub scheduler: SchedulerStats,
    pub dispatcher: DispatcherStats,
}

struct PipelineTasks {
    scheduler: JoinHandle<SchedulerStats>,
    dispatcher: JoinHandle<DispatcherStats>,
}

impl PipelineTasks {
    async fn join(self) -> ShutdownReport {
        // Scheduler first: its exit closes the dispatcher queue
        let scheduler = self.scheduler.await.unwrap_or_else(|e| {
            error!(error = %e, "Window scheduler task failed");
            SchedulerStats::default()
        });
        let dispatcher = self.dispatcher.await.unwrap_or_else(|e| {
            error!(error = %e, "Batch dispatcher task failed");
            DispatcherStats::default()
        });
        ShutdownReport {
            scheduler,
            dispatcher,
        }
    }
}

/// Non-blocking batched writer.
///
/// Lines handed to [`AsyncWriter::submit`] are grouped into windows closed
/// by count or time, and each window is written in a single request.
/// Outcomes are only observable through [`AsyncWriter::subscribe`]; nothing
/// is ever reported back to the submitting caller.
pub struct AsyncWriter {
    config: WriterConfig,
    sender: LineSender,
    bus: EventBus,
    shutdown: CancellationToken,
    runtime: Handle,
    tasks: Option<PipelineTasks>,
}

impl AsyncWriter {
    /// Start a writer posting to the configured InfluxDB endpoint over HTTP.
    pub fn connect(config: WriterConfig) -> Result<Self, WriterError> {
        validate_config(&config)?;
        let transport = HttpTransport::new(&config)?;
        Self::start(config, transport)
    }

    /// Start on the ambient tokio runtime.
    pub fn start<T>(config: WriterConfig, transport: T) -> Result<Self, WriterError>
    where
        T: Transport + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| WriterError::NoRuntime)?;
        Self::start_on(config, Arc::new(transport), runtime)
    }

    /// Start with the background tasks spawned on `runtime`.
    ///
    /// Usable from threads that are not part of any runtime.
    pub fn start_on(
        config: WriterConfig,
        transport: Arc<dyn Transport>,
        runtime: Handle,
    ) -> Result<Self, WriterError> {
        validate_config(&config)?;

        let (sender, lines) = ingestion_channel();
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let bus = EventBus::new(config.events.capacity);
        let shutdown = CancellationToken::new();

        let submitter = Arc::new(BatchSubmitter::new(transport, bus.clone()));

        let scheduler = runtime.spawn(run_scheduler(
            lines,
            batch_tx,
            config.batch,
            shutdown.clone(),
        ));
        let dispatcher = runtime.spawn(run_dispatcher(
            batch_rx,
            submitter,
            config.submit.clone(),
            shutdown.clone(),
        ));

        info!(
            url = %config.url,
            database = %config.database,
            max_lines = config.batch.max_lines,
            "Async writer started"
        );

        Ok(Self {
            config,
            sender,
            bus,
            shutdown,
            runtime,
            tasks: Some(PipelineTasks {
                scheduler,
                dispatcher,
            }),
        })
    }

    /// Queue one line. Never waits on I/O.
    ///
    /// Returns `false` if the writer is shutting down, in which case the
    /// line is dropped.
    pub fn submit(&self, line: impl Into<Line>) -> bool {
        self.sender.submit(line)
    }

    /// A cloneable handle for submitting from other threads or tasks.
    pub fn sender(&self) -> LineSender {
        self.sender.clone()
    }

    pub fn subscribe(&self) -> OutcomeSubscription {
        self.bus.subscribe()
    }

    pub fn subscribe_to_outcomes(&self) -> BoxStream<'static, SubmissionOutcome> {
        self.bus.subscribe().into_stream()
    }

    /// Wait until no outcome has been published for `period`.
    pub async fn await_quiescence(&self, period: Duration) -> usize {
        events::await_quiescence(&self.bus, period).await
    }

    /// Blocking form of [`AsyncWriter::await_quiescence`] for plain threads.
    ///
    /// Must not be called from inside an async context, and the writer's
    /// runtime must be a multi-thread runtime so timers keep running.
    pub fn await_quiescence_blocking(&self, period: Duration) -> usize {
        let bus = self.bus.clone();
        self.runtime
            .block_on(async move { events::await_quiescence(&bus, period).await })
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Stop accepting lines, flush the open window, wait for in-flight
    /// submissions (bounded by `submit.shutdown_timeout`) and close the
    /// event bus.
    pub async fn shutdown(mut self) -> ShutdownReport {
        info!("Async writer shutting down");
        self.sender.stop_accepting();
        self.shutdown.cancel();

        let report = match self.tasks.take() {
            Some(tasks) => tasks.join().await,
            None => ShutdownReport::default(),
        };
        self.bus.close();

        info!(
            lines = report.scheduler.lines,
            batches = report.scheduler.batches,
            succeeded = report.dispatcher.succeeded,
            failed = report.dispatcher.failed,
            cancelled = report.dispatcher.cancelled,
            "Async writer stopped"
        );
        report
    }
}

impl Drop for AsyncWriter {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.take() {
            // Same drain as shutdown(), finished in the background
            self.sender.stop_accepting();
            self.shutdown.cancel();
            let bus = self.bus.clone();
            self.runtime.spawn(async move {
                tasks.join().await;
                bus.close();
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SuccessInfo;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingTransport {
        payloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for CollectingTransport {
        async fn submit(&self, payload: String) -> Result<SuccessInfo, TransportError> {
            self.payloads.lock().unwrap().push(payload);
            Ok(SuccessInfo {
                status_code: 204,
                bytes_received: 0,
            })
        }
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let result = AsyncWriter::start(WriterConfig::default(), CollectingTransport::default());
        assert!(matches!(result, Err(WriterError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_database() {
        let config = WriterConfig::new("http://localhost:8086", "bad name;drop");
        let result = AsyncWriter::start(config, CollectingTransport::default());
        assert!(matches!(result, Err(WriterError::Config(_))));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let config = WriterConfig::default().with_batch(10, None);
        let writer = AsyncWriter::start(config, CollectingTransport::default()).unwrap();
        let sender = writer.sender();

        assert!(writer.submit("cpu v=1i"));
        let report = writer.shutdown().await;
        assert_eq!(report.scheduler.lines, 1);
        assert_eq!(report.dispatcher.succeeded, 1);

        assert!(!sender.submit("cpu v=2i"));
        assert!(!sender.is_accepting());
    }

    #[tokio::test]
    async fn test_drop_flushes_in_background() {
        let transport = Arc::new(CollectingTransport::default());
        let config = WriterConfig::default().with_batch(100, None);
        let writer =
            AsyncWriter::start_on(config, transport.clone(), Handle::current()).unwrap();
        let mut outcomes = writer.subscribe();

        writer.submit("a v=1i");
        writer.submit("b v=2i");
        drop(writer);

        let outcome = outcomes.recv().await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.line_count, 2);
        assert!(outcomes.recv().await.is_none());
        assert_eq!(*transport.payloads.lock().unwrap(), vec!["a v=1i\nb v=2i"]);
    }

    #[tokio::test]
    async fn test_config_is_kept() {
        let config = WriterConfig::new("http://db:8086", "metrics").with_max_in_flight(2);
        let writer = AsyncWriter::start(config, CollectingTransport::default()).unwrap();
        assert_eq!(writer.config().database, "metrics");
        assert_eq!(writer.config().submit.max_in_flight, 2);
        writer.shutdown().await;
    }
}
