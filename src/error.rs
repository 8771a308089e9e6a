//! Error types and handling

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the capture pipeline.
///
/// Only [`Error::DriverFailure`] is meant to reach the user. The decode-path
/// variants are absorbed by the decode worker and turned into
/// [`DecodeOutcome::Failure`](crate::DecodeOutcome::Failure).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// No barcode found, or a checksum/format error inside one attempt.
    #[error("no barcode found")]
    DecodeMiss,
    /// Buffer/dimension mismatch or a zero-area scan region.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },
    /// The camera could not be opened or the preview could not start.
    #[error("camera driver failure: {reason}")]
    DriverFailure { reason: String },
    /// The decode worker did not acknowledge a stop request in time.
    #[error("decode worker did not stop within {waited:?}")]
    ShutdownTimeout { waited: Duration },
    /// The decode worker is gone or no longer accepts frames.
    #[error("decode worker is closed")]
    Closed,
    /// The decode worker thread could not be spawned.
    #[error("failed to spawn decode worker: {reason}")]
    Spawn { reason: String },
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    /// Create a driver failure from any displayable camera error.
    pub fn driver(reason: impl std::fmt::Display) -> Self {
        Self::DriverFailure {
            reason: reason.to_string(),
        }
    }

    /// Whether live scanning should simply move on to the next frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DecodeMiss | Self::MalformedFrame { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
