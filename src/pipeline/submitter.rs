use crate::config::types::SubmitConfig;
use crate::events::{EventBus, SubmissionOutcome};
use crate::pipeline::batch::Batch;
use crate::transport::{SuccessInfo, Transport, TransportError};
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const CANCELLED_AT_SHUTDOWN: &str = "cancelled at shutdown";

/// Counters reported when the dispatcher stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl DispatcherStats {
    fn record(&mut self, outcome: &SubmissionOutcome) {
        if outcome.success {
            self.succeeded += 1;
        } else if outcome.error.as_deref() == Some(CANCELLED_AT_SHUTDOWN) {
            self.cancelled += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Submits one batch through the transport and publishes its outcome.
///
/// Failed batches are reported and dropped, never retried or requeued.
pub struct BatchSubmitter {
    transport: Arc<dyn Transport>,
    bus: EventBus,
}

impl BatchSubmitter {
    pub fn new(transport: Arc<dyn Transport>, bus: EventBus) -> Self {
        Self { transport, bus }
    }

    /// Perform exactly one submission attempt and publish exactly one outcome.
    pub async fn submit(&self, batch: Batch, cancel: &CancellationToken) -> SubmissionOutcome {
        let started = Instant::now();
        let bytes_sent = batch.byte_len();
        let Batch {
            batch_id,
            sequence,
            payload,
            line_count,
            ..
        } = batch;

        let attempt = AssertUnwindSafe(self.transport.submit(payload)).catch_unwind();
        let result = tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(TransportError::Other(CANCELLED_AT_SHUTDOWN.to_string())),
            result = attempt => match result {
                Ok(result) => result,
                Err(_) => Err(TransportError::Other("transport panicked".to_string())),
            },
        };
        let duration = started.elapsed();

        let outcome = match result {
            Ok(SuccessInfo {
                status_code,
                bytes_received,
            }) => {
                debug!(
                    sequence = sequence,
                    lines = line_count,
                    bytes_sent = bytes_sent,
                    status = status_code,
                    duration_ms = duration.as_millis() as u64,
                    "Batch written"
                );
                SubmissionOutcome {
                    batch_id,
                    sequence,
                    success: true,
                    timestamp: Utc::now(),
                    line_count,
                    bytes_sent,
                    bytes_received,
                    status_code: Some(status_code),
                    error: None,
                    duration,
                }
            }
            Err(e) => {
                // Reported once, then the batch is gone
                let message = match &e {
                    TransportError::Other(msg) => msg.clone(),
                    other => other.to_string(),
                };
                warn!(
                    sequence = sequence,
                    lines = line_count,
                    bytes_sent = bytes_sent,
                    error = %e,
                    "Batch write failed, dropping batch"
                );
                SubmissionOutcome {
                    batch_id,
                    sequence,
                    success: false,
                    timestamp: Utc::now(),
                    line_count,
                    bytes_sent,
                    bytes_received: 0,
                    status_code: e.status_code(),
                    error: Some(message),
                    duration,
                }
            }
        };

        self.bus.publish(outcome.clone());
        outcome
    }
}

/// Run the dispatcher task.
///
/// Receives closed batches in close order and starts their submissions in
/// that same order, with at most `max_in_flight` running at once. Once
/// shutdown is requested or the batch queue closes, running submissions get
/// `shutdown_timeout` to finish; anything still pending after that is
/// cancelled and reported as such.
pub async fn run_dispatcher(
    mut input: mpsc::UnboundedReceiver<Batch>,
    submitter: Arc<BatchSubmitter>,
    config: SubmitConfig,
    shutdown: CancellationToken,
) -> DispatcherStats {
    let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
    let cancel = CancellationToken::new();
    let draining = shutdown.child_token();
    let mut in_flight: JoinSet<SubmissionOutcome> = JoinSet::new();
    let mut stats = DispatcherStats::default();
    let mut input_open = true;

    let grace = async {
        draining.cancelled().await;
        sleep(config.shutdown_timeout).await;
    };
    tokio::pin!(grace);

    info!(
        max_in_flight = config.max_in_flight,
        "Batch dispatcher started"
    );

    loop {
        if !input_open && in_flight.is_empty() {
            break;
        }

        tokio::select! {
            batch = input.recv(), if input_open => {
                let Some(batch) = batch else {
                    input_open = false;
                    draining.cancel();
                    if !in_flight.is_empty() {
                        info!(
                            in_flight = in_flight.len(),
                            timeout_ms = config.shutdown_timeout.as_millis() as u64,
                            "Waiting for in-flight submissions"
                        );
                    }
                    continue;
                };

                // FIFO semaphore: submissions start in close order
                let acquired = tokio::select! {
                    permit = Arc::clone(&permits).acquire_owned() => permit,
                    _ = &mut grace, if !cancel.is_cancelled() => {
                        cancel_in_flight(&cancel, in_flight.len());
                        Arc::clone(&permits).acquire_owned().await
                    }
                };
                let permit = match acquired {
                    Ok(permit) => permit,
                    Err(_) => {
                        error!(sequence = batch.sequence, "Submission permits closed, dropping batch");
                        continue;
                    }
                };

                stats.submitted += 1;
                let submitter = Arc::clone(&submitter);
                let cancel = cancel.clone();
                in_flight.spawn(async move {
                    let outcome = submitter.submit(batch, &cancel).await;
                    drop(permit);
                    outcome
                });
            }

            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                record_joined(&mut stats, joined);
            }

            _ = &mut grace, if !cancel.is_cancelled() => {
                cancel_in_flight(&cancel, in_flight.len());
            }

            else => break,
        }
    }

    info!(
        submitted = stats.submitted,
        succeeded = stats.succeeded,
        failed = stats.failed,
        cancelled = stats.cancelled,
        "Batch dispatcher shutdown complete"
    );

    stats
}

fn cancel_in_flight(cancel: &CancellationToken, remaining: usize) {
    if remaining > 0 {
        warn!(
            remaining = remaining,
            "Shutdown timeout reached, cancelling in-flight submissions"
        );
    }
    cancel.cancel();
}

fn record_joined(
    stats: &mut DispatcherStats,
    joined: Result<SubmissionOutcome, tokio::task::JoinError>,
) {
    match joined {
        Ok(outcome) => stats.record(&outcome),
        Err(e) => {
            error!(error = %e, "Submission task failed");
            stats.failed += 1;
        }
    }
}
