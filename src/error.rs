//! Error types shared across the crate.

use std::io;

use thiserror::Error;

/// Errors surfaced by the shipper and its components.
#[derive(Debug, Error)]
pub enum ShipError {
    /// Invalid caller-supplied input (empty path, zero timeout, bad port).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Failure on the underlying socket. `op` names the operation that
    /// failed (connect, read, send, ...).
    #[error("socket {op}: {source}")]
    Socket {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    /// The same schema key was registered with two different encodings.
    #[error("schema registry conflict: expected='{expected}'; actual='{actual}'")]
    SchemaConflict { expected: String, actual: String },
}

impl ShipError {
    pub(crate) fn socket(op: &'static str, source: io::Error) -> Self {
        ShipError::Socket { op, source }
    }

    /// True when the error came from the socket layer. Worker loops treat
    /// these as transient and keep running.
    pub fn is_socket(&self) -> bool {
        matches!(self, ShipError::Socket { .. })
    }
}

/// Internal sentinel raised at worker interrupt points once the stop flag
/// is observed. Caught at loop scope; never crosses the crate boundary.
#[derive(Debug)]
pub(crate) struct Interrupted;
