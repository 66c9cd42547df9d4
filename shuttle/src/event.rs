//! Messages exchanged between pool handles, the ticker and the control loop.

use std::fmt;

/// A requested state transition, processed by the control loop in arrival order.
#[derive(Debug)]
pub(crate) enum Event<V> {
    /// Upsert `key` with `value`.
    Add { key: String, value: V },
    /// Remove `key`.
    Delete { key: String },
    /// Flush whatever has accumulated (sent by the ticker).
    FlushTrigger,
    /// Final flush, then terminate the loop.
    Stop,
}

impl<V> Event<V> {
    /// Short name for log messages.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Event::Add { .. } => "add",
            Event::Delete { .. } => "delete",
            Event::FlushTrigger => "flush",
            Event::Stop => "stop",
        }
    }
}

/// Why a flush happened. Used for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushReason {
    Size,
    Interval,
    Stop,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushReason::Size => write!(f, "size"),
            FlushReason::Interval => write!(f, "interval"),
            FlushReason::Stop => write!(f, "stop"),
        }
    }
}
