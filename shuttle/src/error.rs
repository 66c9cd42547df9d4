//! Error types for pool construction and configuration.

use thiserror::Error;

/// Errors returned by the fallible constructors and config loaders.
///
/// Handle operations (`add`, `delete`, `stop`) never fail; sink errors are
/// logged by the control loop and never reach this type.
#[derive(Error, Debug)]
pub enum ShuttleError {
    /// The pool was constructed outside a Tokio runtime.
    #[error("shuttle: no tokio runtime available to spawn the control loop")]
    NoRuntime,

    /// The configuration document could not be parsed.
    #[error("shuttle: config error: {0}")]
    Config(String),

    /// A duration string was malformed.
    #[error("shuttle: invalid duration: {0}")]
    InvalidDuration(String),
}

impl From<serde_yaml::Error> for ShuttleError {
    fn from(e: serde_yaml::Error) -> Self {
        ShuttleError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for ShuttleError {
    fn from(e: serde_json::Error) -> Self {
        ShuttleError::Config(e.to_string())
    }
}
