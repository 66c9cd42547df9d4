//! Sink trait: the downstream consumer of flushed batches.

use async_trait::async_trait;

use crate::state::Batch;

/// Receives every non-empty batch the pool flushes.
///
/// The control loop awaits `shuttle` before draining the next event, so a
/// slow sink stalls producers. The batch is only borrowed for the duration
/// of the call and is dropped afterwards, whatever the outcome.
///
/// Errors are logged and the batch is discarded: delivery is at-most-once.
///
/// Plain closures implement `Sink`:
///
/// ```
/// use giztoy_shuttle::{Batch, Sink};
///
/// fn assert_sink<S: Sink<u32>>(_: &S) {}
///
/// let sink = |batch: &Batch<u32>| -> anyhow::Result<()> {
///     println!("uploading {} entries", batch.len());
///     Ok(())
/// };
/// assert_sink(&sink);
/// ```
#[async_trait]
pub trait Sink<V>: Send + Sync {
    /// Processes a batch.
    async fn shuttle(&self, batch: &Batch<V>) -> anyhow::Result<()>;
}

#[async_trait]
impl<V, F> Sink<V> for F
where
    V: Sync,
    F: Fn(&Batch<V>) -> anyhow::Result<()> + Send + Sync,
{
    async fn shuttle(&self, batch: &Batch<V>) -> anyhow::Result<()> {
        self(batch)
    }
}

/// Sink that discards every batch. Used when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopSink;

#[async_trait]
impl<V: Sync> Sink<V> for NopSink {
    async fn shuttle(&self, _batch: &Batch<V>) -> anyhow::Result<()> {
        Ok(())
    }
}
