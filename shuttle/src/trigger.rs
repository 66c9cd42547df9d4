//! Periodic flush trigger.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::Event;

/// Spawns the ticker that sends a `FlushTrigger` every `period`.
///
/// The first trigger fires one full period after spawning. The task exits
/// when `cancel` fires or when the control loop has gone away.
pub(crate) fn spawn_ticker<V: Send + 'static>(
    rt: &tokio::runtime::Handle,
    period: Duration,
    tx: mpsc::Sender<Event<V>>,
    cancel: CancellationToken,
) {
    rt.spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = tx.send(Event::FlushTrigger) => {
                            if result.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        debug!("shuttle: ticker stopped");
    });
}
