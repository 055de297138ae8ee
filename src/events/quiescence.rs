use super::EventBus;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Wait until `period` has passed without any outcome being published.
///
/// The quiet period starts counting at call time, so waiting on an idle
/// writer returns after `period`. Every outcome restarts the countdown.
/// This is an absence-of-activity heuristic, not a delivery guarantee.
///
/// Returns how many outcomes were observed while waiting.
pub async fn await_quiescence(bus: &EventBus, period: Duration) -> usize {
    let mut subscription = bus.subscribe();
    let mut deadline = quiet_deadline(period);
    let mut observed = 0;

    loop {
        tokio::select! {
            _ = quiet_timer(deadline) => break,
            signal = subscription.recv() => match signal {
                Some(outcome) => {
                    observed += 1;
                    trace!(sequence = outcome.sequence, "Activity observed, restarting quiet period");
                    deadline = quiet_deadline(period);
                }
                None => {
                    // No further outcomes can arrive; honour the remaining period
                    quiet_timer(deadline).await;
                    break;
                }
            }
        }
    }

    observed
}

/// `None` when the period reaches past the clock's range: never quiet.
fn quiet_deadline(period: Duration) -> Option<Instant> {
    Instant::now().checked_add(period)
}

async fn quiet_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
