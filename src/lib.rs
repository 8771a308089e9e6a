//! Camera frame capture and QR decode coordination
//!
//! This crate drives a live barcode scan: it requests one frame at a time
//! from a camera, decodes it on a dedicated worker thread, and reports each
//! outcome to the UI. At most one decode is ever in flight, and a session
//! can be shut down from the UI within a bounded wait.
//!
//! The pieces, bottom-up:
//!
//! - [`frame`]: raw frames, crop rectangles and scan regions
//! - [`luminance`]: region extraction and orientation correction
//! - [`decoder`]: the [`Decoder`] trait and the bundled `rqrr` backend
//! - [`state`]: the pure capture state machine
//! - [`worker`]: the decode thread
//! - [`session`]: [`CaptureSession`], tying it all to a [`FrameSource`] and a
//!   [`ResultSink`]
//!
//! Still images are decoded without a session through
//! [`decode_static_image`].

pub mod config;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod luminance;
pub mod session;
pub mod state;
mod still;
pub mod worker;

// Re-export main types
pub use config::{
    BarcodeFormat, DecodeHints, DecodePath, Feedback, ScanConfig, DEFAULT_CROP_SCALE,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
#[cfg(feature = "qr")]
pub use decoder::qr::QrDecoder;
pub use decoder::{DecodeOutcome, Decoder};
pub use error::{Error, Result};
pub use frame::{Frame, FrameFormat, Rect, ScanRegion};
pub use luminance::LuminanceImage;
pub use session::{
    CaptureSession, FrameReady, FrameSource, NoInsets, PlatformMetrics, ResultSink,
    SessionBuilder,
};
pub use state::{CaptureState, RequestId};
pub use still::decode_static_with;
#[cfg(feature = "qr")]
pub use still::{decode_static_image, decode_static_image_with};
