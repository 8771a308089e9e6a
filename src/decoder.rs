//! Decode primitive
//!
//! The pixel-level barcode decoder is an opaque collaborator behind the
//! [`Decoder`] trait. The decode worker owns one instance for its whole
//! lifetime and resets it after every attempt.

use std::panic::{self, AssertUnwindSafe};

use tracing::{trace, warn};

use crate::luminance::LuminanceImage;
use crate::Result;

#[cfg(feature = "qr")]
pub mod qr;

/// Result of one decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Success(String),
    Failure,
}

impl DecodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Success(text) => Some(text),
            Self::Failure => None,
        }
    }

    /// The decoded text, or an empty string on failure.
    pub fn into_text(self) -> String {
        match self {
            Self::Success(text) => text,
            Self::Failure => String::new(),
        }
    }
}

/// A barcode decoder that may keep internal state between calls.
pub trait Decoder: Send {
    /// Look for a barcode in `image`.
    ///
    /// Returns [`Error::DecodeMiss`](crate::Error::DecodeMiss) when nothing is found.
    fn decode(&mut self, image: &LuminanceImage) -> Result<String>;

    /// Drop any state accumulated by the previous attempt.
    fn reset(&mut self);
}

impl<D: Decoder + ?Sized> Decoder for Box<D> {
    fn decode(&mut self, image: &LuminanceImage) -> Result<String> {
        (**self).decode(image)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Run one attempt and reset the decoder, whatever happens.
///
/// Errors and panics raised by the decoder are normalised to
/// [`DecodeOutcome::Failure`]. An empty decode counts as a miss.
pub fn decode_once<D: Decoder + ?Sized>(decoder: &mut D, image: &LuminanceImage) -> DecodeOutcome {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(image)));
    decoder.reset();

    match attempt {
        Ok(Ok(text)) if !text.is_empty() => DecodeOutcome::Success(text),
        Ok(Ok(_)) => DecodeOutcome::Failure,
        Ok(Err(err)) if err.is_recoverable() => {
            trace!("no barcode: {err}");
            DecodeOutcome::Failure
        }
        Ok(Err(err)) => {
            warn!("decode attempt failed: {err}");
            DecodeOutcome::Failure
        }
        Err(_) => {
            warn!("decoder panicked; treating attempt as a miss");
            DecodeOutcome::Failure
        }
    }
}
