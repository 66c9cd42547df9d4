//! In-memory keyed batching buffer.
//!
//! Producers [`add`](Pool::add) and [`delete`](Pool::delete) keyed entries;
//! the pool accumulates them and hands the whole batch to a [`Sink`] when
//! either the size threshold is reached or the flush interval elapses. The
//! buffer is cleared after every flush, whether the sink succeeded or not.
//!
//! All mutations are serialized through one channel into a single control
//! loop task, which is the only owner of the buffered entries. A periodic
//! ticker feeds flush triggers into the same channel.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use giztoy_shuttle::{Batch, Options, Pool};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pool = Pool::spawn(
//!     Options::new()
//!         .with_func(|batch: &Batch<String>| {
//!             println!("uploading {} entries", batch.len());
//!             Ok(())
//!         })
//!         .with_flush_interval(Duration::from_secs(1))
//!         .with_max_entries(20),
//! )
//! .unwrap();
//!
//! pool.add("device-001", "online".to_string()).await;
//! pool.delete("device-001").await;
//!
//! pool.stop().await;
//! pool.stopped().await;
//! # }
//! ```
//!
//! # Process-wide pool
//!
//! [`new`] lazily constructs one pool of [`serde_json::Value`] entries for
//! the whole process. The first call wins; later calls return the same pool
//! and ignore their options.

mod error;
mod event;
mod options;
mod pool;
mod sink;
mod state;
mod trigger;

use std::sync::OnceLock;

use serde_json::Value;

pub use error::ShuttleError;
pub use options::{Config, DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_ENTRIES, Interval, Options};
pub use pool::Pool;
pub use sink::{NopSink, Sink};
pub use state::Batch;

static POOL: OnceLock<Pool<Value>> = OnceLock::new();

/// Returns the process-wide pool, constructing it with `options` on first use.
///
/// Construction spawns the control loop on the current Tokio runtime, so the
/// first call must happen inside one; it fails with
/// [`ShuttleError::NoRuntime`] otherwise. Once constructed, the pool is
/// returned from any context.
pub fn new(options: Options<Value>) -> Result<&'static Pool<Value>, ShuttleError> {
    if let Some(pool) = POOL.get() {
        return Ok(pool);
    }
    let rt = tokio::runtime::Handle::try_current().map_err(|_| ShuttleError::NoRuntime)?;
    Ok(POOL.get_or_init(|| Pool::spawn_on(&rt, options)))
}

/// Returns the process-wide pool if [`new`] has constructed it.
pub fn global() -> Option<&'static Pool<Value>> {
    POOL.get()
}

#[cfg(test)]
mod tests;
