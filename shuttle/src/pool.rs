//! Pool handle and the control loop behind it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ShuttleError;
use crate::event::{Event, FlushReason};
use crate::options::Options;
use crate::sink::Sink;
use crate::state::PoolState;
use crate::trigger::spawn_ticker;

/// Capacity of the event channel. One slot keeps the handoff as close to
/// a rendezvous as tokio's bounded channel allows.
const EVENT_QUEUE_SIZE: usize = 1;

/// Handle to a running batching pool.
///
/// Every operation is translated into an event and handed to a single
/// control loop task, which owns the buffered entries. Operations return once
/// the event is enqueued, before it is applied. The channel holds one event,
/// so a producer can run at most one event ahead of the loop.
///
/// # Misuse
///
/// `add` and `delete` after `stop`, or with an empty key, are dropped and
/// logged. Nothing is ever returned to the caller.
///
/// # Drop
///
/// Dropping the handle stops the ticker and closes the channel; the loop
/// then performs a final flush and exits, as if `stop` had been called.
pub struct Pool<V> {
    tx: mpsc::Sender<Event<V>>,
    closed: AtomicBool,
    ticker: CancellationToken,
    done: CancellationToken,
    flush_interval: Duration,
    max_entries: usize,
}

impl<V: Send + Sync + 'static> Pool<V> {
    /// Starts a pool on the current Tokio runtime.
    ///
    /// Returns [`ShuttleError::NoRuntime`] when called outside a runtime.
    pub fn spawn(options: Options<V>) -> Result<Self, ShuttleError> {
        let rt = Handle::try_current().map_err(|_| ShuttleError::NoRuntime)?;
        Ok(Self::spawn_on(&rt, options))
    }

    /// Starts a pool on the given runtime.
    pub fn spawn_on(rt: &Handle, options: Options<V>) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let ticker = CancellationToken::new();
        let done = CancellationToken::new();

        spawn_ticker(rt, options.flush_interval(), tx.clone(), ticker.clone());

        let control = ControlLoop {
            state: PoolState::new(options.max_entries()),
            sink: options.sink(),
        };
        rt.spawn(control.run(rx, ticker.clone(), done.clone()));

        info!(
            "shuttle: pool started (max_entries={}, flush_interval={:?})",
            options.max_entries(),
            options.flush_interval()
        );

        Self {
            tx,
            closed: AtomicBool::new(false),
            ticker,
            done,
            flush_interval: options.flush_interval(),
            max_entries: options.max_entries(),
        }
    }
}

impl<V> Pool<V> {
    /// Buffers `value` under `key`, replacing any earlier value.
    pub async fn add(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        if key.is_empty() {
            warn!("shuttle: dropping add with empty key");
            return;
        }
        self.send(Event::Add { key, value }).await;
    }

    /// Removes `key` from the buffer.
    pub async fn delete(&self, key: impl Into<String>) {
        let key = key.into();
        if key.is_empty() {
            warn!("shuttle: dropping delete with empty key");
            return;
        }
        self.send(Event::Delete { key }).await;
    }

    /// Requests a final flush and shutdown of the control loop.
    ///
    /// Returns once the request is enqueued; use [`Pool::stopped`] to wait
    /// for the final flush. Calling `stop` again is a no-op.
    pub async fn stop(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("shuttle: stop already requested");
            return;
        }
        if self.tx.send(Event::Stop).await.is_err() {
            debug!("shuttle: control loop already exited");
        }
    }

    /// Waits until the control loop has flushed for the last time and exited.
    pub async fn stopped(&self) {
        self.done.cancelled().await;
    }

    /// Returns true once the control loop has exited.
    pub fn is_stopped(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Returns the effective flush ticker period.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Returns the effective size threshold.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    #[cfg(test)]
    pub(crate) fn ticker_cancelled(&self) -> bool {
        self.ticker.is_cancelled()
    }

    async fn send(&self, event: Event<V>) {
        if self.closed.load(Ordering::Acquire) {
            warn!("shuttle: pool stopped, dropping {}", event.kind());
            return;
        }
        if let Err(e) = self.tx.send(event).await {
            warn!("shuttle: control loop exited, dropping {}", e.0.kind());
        }
    }
}

impl<V> Drop for Pool<V> {
    fn drop(&mut self) {
        self.ticker.cancel();
    }
}

/// The single consumer of the event channel.
struct ControlLoop<V> {
    state: PoolState<V>,
    sink: Arc<dyn Sink<V>>,
}

impl<V: Send + Sync + 'static> ControlLoop<V> {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<Event<V>>,
        ticker: CancellationToken,
        done: CancellationToken,
    ) {
        loop {
            match rx.recv().await {
                Some(Event::Add { key, value }) => {
                    if self.state.add(key, value) {
                        self.flush(FlushReason::Size).await;
                    }
                }
                Some(Event::Delete { key }) => self.state.delete(&key),
                Some(Event::FlushTrigger) => self.flush(FlushReason::Interval).await,
                // a closed channel means every handle is gone
                Some(Event::Stop) | None => {
                    self.flush(FlushReason::Stop).await;
                    break;
                }
            }
        }

        ticker.cancel();
        rx.close();
        done.cancel();
        info!("shuttle: pool stopped");
    }

    async fn flush(&mut self, reason: FlushReason) {
        // state is reset here, before the sink runs, so nothing survives a
        // failed or panicking sink
        let Some(batch) = self.state.take() else {
            return;
        };
        debug!("shuttle: flushing {} entries ({})", batch.len(), reason);

        match AssertUnwindSafe(self.sink.shuttle(&batch)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("shuttle: sink failed, dropped {} entries: {:#}", batch.len(), e);
            }
            Err(_) => {
                error!("shuttle: sink panicked, dropped {} entries", batch.len());
            }
        }
        debug_assert_eq!(self.state.count(), 0);
    }
}
