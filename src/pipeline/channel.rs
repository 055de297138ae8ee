use crate::line::Line;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

pub type LineReceiver = mpsc::UnboundedReceiver<Line>;

/// Producer side of the ingestion channel.
///
/// Unbounded: `submit` never waits, whatever the state of the network.
/// Memory grows instead when producers outpace the transport.
#[derive(Clone)]
pub struct LineSender {
    tx: mpsc::UnboundedSender<Line>,
    accepting: Arc<AtomicBool>,
}

impl LineSender {
    /// Hand one line to the pipeline.
    ///
    /// Returns `false` when the writer is shutting down; the line is dropped.
    pub fn submit(&self, line: impl Into<Line>) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            trace!("Writer shutting down, dropping line");
            return false;
        }

        match self.tx.send(line.into()) {
            Ok(()) => true,
            Err(_) => {
                trace!("Ingestion channel closed, dropping line");
                false
            }
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Refuse further lines from every clone of this sender.
    pub(crate) fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Release);
    }
}

/// Create the unbounded ingestion channel
pub fn ingestion_channel() -> (LineSender, LineReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = LineSender {
        tx,
        accepting: Arc::new(AtomicBool::new(true)),
    };
    (sender, rx)
}
