use crate::config::types::BatchConfig;
use crate::line::Line;
use crate::pipeline::batch::{Batch, CloseTrigger};
use crate::pipeline::channel::LineReceiver;
use crate::pipeline::window::{Closed, Window, WindowState};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Counters reported when the scheduler stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub lines: u64,
    pub batches: u64,
    pub empty_windows: u64,
}

/// Turns the line stream into batches with a count-or-time trigger.
///
/// Owns the active window for its whole open lifetime. Closed windows are
/// numbered in close order and handed to the dispatcher queue.
pub struct WindowScheduler {
    config: BatchConfig,
    output: mpsc::UnboundedSender<Batch>,
    window: Window,
    next_sequence: u64,
    stats: SchedulerStats,
}

impl WindowScheduler {
    pub fn new(config: BatchConfig, output: mpsc::UnboundedSender<Batch>) -> Self {
        Self {
            window: Window::open(&config),
            config,
            output,
            next_sequence: 0,
            stats: SchedulerStats::default(),
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Append a line to the active window, closing it when full.
    pub fn accept(&mut self, line: Line) {
        if line.is_empty() {
            trace!("Ignoring empty line");
            return;
        }
        self.stats.lines += 1;

        if self.config.is_unbatched() {
            self.emit_single(line);
            return;
        }

        // rotate() always replaces a closed window
        debug_assert_eq!(self.window.state(), WindowState::Open);
        if let Ok(true) = self.window.push(line) {
            self.rotate(CloseTrigger::Count);
        }
    }

    /// Deadline of the active window's timer, if time-bounded.
    pub fn deadline(&self) -> Option<Instant> {
        if self.config.is_unbatched() {
            None
        } else {
            self.window.deadline()
        }
    }

    /// Close the active window for `trigger` and open the next one.
    pub fn rotate(&mut self, trigger: CloseTrigger) {
        self.seal(trigger);
        self.window = Window::open(&self.config);
    }

    /// Close the active window without opening another.
    pub fn finish(&mut self) {
        self.seal(CloseTrigger::Shutdown);
    }

    fn seal(&mut self, trigger: CloseTrigger) {
        match self.window.close() {
            Closed::Contents(contents) => {
                let batch = Batch {
                    batch_id: Uuid::new_v4(),
                    sequence: self.take_sequence(),
                    payload: contents.payload,
                    line_count: contents.line_count,
                    trigger,
                    opened_at: contents.opened_at,
                    closed_at: contents.closed_at,
                };
                self.emit(batch);
            }
            Closed::Empty => {
                self.stats.empty_windows += 1;
                trace!(trigger = %trigger, "Discarding empty window");
            }
            Closed::AlreadyClosed => {
                trace!(trigger = %trigger, "Window already closed");
            }
        }
    }

    fn emit_single(&mut self, line: Line) {
        let now = Instant::now();
        let batch = Batch {
            batch_id: Uuid::new_v4(),
            sequence: self.take_sequence(),
            payload: line.into_string(),
            line_count: 1,
            trigger: CloseTrigger::Single,
            opened_at: now,
            closed_at: now,
        };
        self.emit(batch);
    }

    fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn emit(&mut self, batch: Batch) {
        debug!(
            sequence = batch.sequence,
            lines = batch.line_count,
            bytes = batch.byte_len(),
            trigger = %batch.trigger,
            "Window closed"
        );
        self.stats.batches += 1;
        if let Err(rejected) = self.output.send(batch) {
            warn!(
                sequence = rejected.0.sequence,
                "Dispatcher queue closed, dropping batch"
            );
        }
    }
}

/// Run the window scheduler task.
///
/// Consumes lines until shutdown is requested or every sender is gone, then
/// drains whatever was already accepted into final batches.
pub async fn run_scheduler(
    mut input: LineReceiver,
    output: mpsc::UnboundedSender<Batch>,
    config: BatchConfig,
    shutdown: CancellationToken,
) -> SchedulerStats {
    let mut scheduler = WindowScheduler::new(config, output);

    info!(
        max_lines = config.max_lines,
        max_time_ms = config.max_time.map(|t| t.as_millis() as u64),
        unbatched = config.is_unbatched(),
        "Window scheduler started"
    );

    loop {
        let deadline = scheduler.deadline();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("Shutdown requested, draining ingestion channel");
                break;
            }

            _ = window_timer(deadline) => {
                scheduler.rotate(CloseTrigger::Time);
            }

            result = input.recv() => {
                match result {
                    Some(line) => scheduler.accept(line),
                    None => {
                        info!("All line senders dropped, flushing remaining data");
                        break;
                    }
                }
            }
        }
    }

    // Nothing new gets in; everything already queued still goes out
    input.close();
    let mut drained = 0u64;
    while let Some(line) = input.recv().await {
        scheduler.accept(line);
        drained += 1;
    }
    scheduler.finish();

    let stats = scheduler.stats();
    info!(
        lines = stats.lines,
        batches = stats.batches,
        drained = drained,
        "Window scheduler shutdown complete"
    );

    stats
}

async fn window_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
