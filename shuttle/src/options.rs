//! Pool options and file-based configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ShuttleError;
use crate::sink::{NopSink, Sink};
use crate::state::Batch;

/// Default number of distinct entries that triggers a flush.
pub const DEFAULT_MAX_ENTRIES: usize = 20;

/// Default period of the flush ticker.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Options applied once when a pool is constructed.
///
/// Zero values fall back to the defaults.
///
/// ```
/// use std::time::Duration;
/// use giztoy_shuttle::{Batch, Options};
///
/// let opts = Options::<String>::new()
///     .with_func(|batch: &Batch<String>| {
///         println!("{} entries", batch.len());
///         Ok(())
///     })
///     .with_flush_interval(Duration::from_secs(1))
///     .with_max_entries(100);
/// assert_eq!(opts.max_entries(), 100);
/// ```
pub struct Options<V> {
    sink: Arc<dyn Sink<V>>,
    flush_interval: Duration,
    max_entries: usize,
}

impl<V: Sync + 'static> Options<V> {
    /// Creates options with the no-op sink and default thresholds.
    pub fn new() -> Self {
        Self {
            sink: Arc::new(NopSink),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    /// Creates options from a loaded [`Config`], keeping the no-op sink.
    pub fn from_config(cfg: &Config) -> Self {
        Self::new()
            .with_flush_interval(cfg.flush_interval.0)
            .with_max_entries(cfg.max_entries)
    }
}

impl<V> Options<V> {
    /// Set the sink that receives flushed batches.
    pub fn with_sink(mut self, sink: impl Sink<V> + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Set a closure as the sink.
    pub fn with_func<F>(mut self, f: F) -> Self
    where
        V: Sync,
        F: Fn(&Batch<V>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.sink = Arc::new(f);
        self
    }

    /// Set the flush ticker period. Zero keeps the default.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = if interval.is_zero() {
            DEFAULT_FLUSH_INTERVAL
        } else {
            interval
        };
        self
    }

    /// Set the size threshold. Zero keeps the default.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = if max_entries == 0 {
            DEFAULT_MAX_ENTRIES
        } else {
            max_entries
        };
        self
    }

    /// Returns the flush ticker period.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Returns the size threshold.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub(crate) fn sink(&self) -> Arc<dyn Sink<V>> {
        Arc::clone(&self.sink)
    }
}

impl<V: Sync + 'static> Default for Options<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for Options<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("flush_interval", &self.flush_interval)
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

/// Serializable pool thresholds, e.g. loaded from a YAML file:
///
/// ```yaml
/// flush_interval: 1m30s
/// max_entries: 50
/// ```
///
/// Missing fields and zero values mean "use the default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Flush ticker period, as "1h30m", "30s", "500ms" or integer seconds.
    #[serde(default)]
    pub flush_interval: Interval,

    /// Size threshold.
    #[serde(default)]
    pub max_entries: usize,
}

impl Config {
    /// Parses a YAML document.
    pub fn from_yaml(s: &str) -> Result<Self, ShuttleError> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Parses a JSON document.
    pub fn from_json(s: &str) -> Result<Self, ShuttleError> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Flush period in config files.
///
/// Written as unit-suffixed parts ("1h30m", "1s500ms", "250us"); a bare
/// number, quoted or not, counts as seconds. Output keeps every non-zero
/// part down to nanoseconds, so printing and re-parsing is lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Interval(pub Duration);

impl Interval {
    /// Parses strings like "1h30m", "45s", "250ms", "10us". A bare number is seconds.
    pub fn parse(s: &str) -> Result<Self, ShuttleError> {
        parse_interval(s).map(Interval)
    }
}

impl From<Duration> for Interval {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl From<Interval> for Duration {
    fn from(i: Interval) -> Self {
        i.0
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_zero() {
            return f.write_str("0s");
        }
        let secs = self.0.as_secs();
        let nanos = self.0.subsec_nanos();
        let parts = [
            (secs / 3600, "h"),
            (secs % 3600 / 60, "m"),
            (secs % 60, "s"),
            (u64::from(nanos / 1_000_000), "ms"),
            (u64::from(nanos / 1_000 % 1_000), "us"),
            (u64::from(nanos % 1_000), "ns"),
        ];
        for (n, unit) in parts.into_iter().filter(|(n, _)| *n > 0) {
            write!(f, "{}{}", n, unit)?;
        }
        Ok(())
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Accepted config shapes for an interval.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawInterval {
    Secs(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<RawInterval>::deserialize(deserializer)? {
            None => Ok(Interval::default()),
            Some(RawInterval::Secs(n)) => Ok(Interval(Duration::from_secs(n))),
            Some(RawInterval::Text(s)) => Interval::parse(&s).map_err(serde::de::Error::custom),
        }
    }
}

fn parse_interval(s: &str) -> Result<Duration, ShuttleError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Duration::ZERO);
    }

    let invalid = || ShuttleError::InvalidDuration(s.to_string());
    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let num: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "h" => Duration::from_secs(num.checked_mul(3600).ok_or_else(invalid)?),
            "m" => Duration::from_secs(num.checked_mul(60).ok_or_else(invalid)?),
            "s" | "" => Duration::from_secs(num),
            "ms" => Duration::from_millis(num),
            "us" | "µs" => Duration::from_micros(num),
            "ns" => Duration::from_nanos(num),
            _ => return Err(invalid()),
        };
        total = total.checked_add(part).ok_or_else(invalid)?;
        rest = &rest[unit_len..];
    }

    Ok(total)
}
