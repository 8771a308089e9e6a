//! Scan session configuration
//!
//! All decode behaviour is fixed when a session (and therefore its decode
//! worker) is constructed. There is no process-wide state: to change how
//! frames are decoded, build a new [`ScanConfig`] and start a new session.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use qrcapture::{BarcodeFormat, DecodeHints, DecodePath, ScanConfig};
//!
//! let config = ScanConfig::new()
//!     .hints(
//!         DecodeHints::new()
//!             .character_set("gb18030")
//!             .formats(BarcodeFormat::QR_CODE),
//!     )
//!     .decode_path(DecodePath::FullFrame)
//!     .shutdown_timeout(Duration::from_millis(250));
//!
//! assert!(config.decode_hints().barcode_formats().is_qr_only());
//! assert_eq!(config.crop_scale_factor(), 1.1);
//! ```

use std::fmt;
use std::time::Duration;

/// Enlargement applied to the UI crop rectangle before decoding.
pub const DEFAULT_CROP_SCALE: f32 = 1.1;

/// How long `shutdown` waits for the decode worker to exit.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Set of barcode families the decoder should look for.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BarcodeFormat(u8);

impl BarcodeFormat {
    /// 2D QR codes
    pub const QR_CODE: Self = Self(1);
    /// 1D linear barcodes
    pub const BARCODE: Self = Self(2);

    /// Start from an explicit set
    pub const fn new(format: Self) -> Self {
        format
    }

    /// Add a family to the set
    pub fn add(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Replace the set
    pub fn set(self, other: Self) -> Self {
        other
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_qr_only(self) -> bool {
        self == Self::QR_CODE
    }

    /// Raw bit representation
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl Default for BarcodeFormat {
    fn default() -> Self {
        Self::QR_CODE
    }
}

impl fmt::Debug for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        if self.contains(Self::QR_CODE) {
            set.entry(&"QR_CODE");
        }
        if self.contains(Self::BARCODE) {
            set.entry(&"BARCODE");
        }
        set.finish()
    }
}

/// Hints handed to the decode primitive when the worker is built.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeHints {
    pub(crate) character_set: String,
    pub(crate) try_harder: bool,
    pub(crate) formats: BarcodeFormat,
}

impl Default for DecodeHints {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeHints {
    /// UTF-8 text, try harder, QR codes only.
    pub fn new() -> Self {
        Self {
            character_set: "utf-8".to_string(),
            try_harder: true,
            formats: BarcodeFormat::QR_CODE,
        }
    }

    /// Character set used to interpret byte-mode payloads.
    ///
    /// Any WHATWG encoding label is accepted; unknown labels fall back to
    /// UTF-8.
    pub fn character_set(mut self, label: impl Into<String>) -> Self {
        self.character_set = label.into();
        self
    }

    /// Spend more time per frame (for example, also try the inverted image).
    pub fn try_harder(mut self, enabled: bool) -> Self {
        self.try_harder = enabled;
        self
    }

    pub fn formats(mut self, formats: BarcodeFormat) -> Self {
        self.formats = formats;
        self
    }

    pub fn charset_label(&self) -> &str {
        &self.character_set
    }

    pub fn is_try_harder(&self) -> bool {
        self.try_harder
    }

    pub fn barcode_formats(&self) -> BarcodeFormat {
        self.formats
    }
}

/// Which frame-to-luminance path the decode worker takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePath {
    /// Decode only the cached scan region, in sensor byte order.
    #[default]
    Cropped,
    /// Rotate the landscape sensor frame to portrait and decode all of it.
    FullFrame,
}

/// Feedback the result sink should play when a code is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feedback {
    pub beep: bool,
    pub vibrate: bool,
}

impl Feedback {
    pub const NONE: Self = Self {
        beep: false,
        vibrate: false,
    };

    pub fn is_enabled(self) -> bool {
        self.beep || self.vibrate
    }
}

impl Default for Feedback {
    fn default() -> Self {
        Self {
            beep: true,
            vibrate: true,
        }
    }
}

/// Immutable configuration for one capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub(crate) hints: DecodeHints,
    pub(crate) decode_path: DecodePath,
    pub(crate) crop_scale: f32,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) feedback: Feedback,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanConfig {
    /// Create a configuration with the defaults used for live scanning
    ///
    /// - QR codes only, UTF-8, try harder
    /// - Cropped decode path with the crop rectangle enlarged by 1.1x
    /// - 500 ms shutdown wait
    /// - Beep and vibrate on success
    pub fn new() -> Self {
        Self {
            hints: DecodeHints::new(),
            decode_path: DecodePath::Cropped,
            crop_scale: DEFAULT_CROP_SCALE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            feedback: Feedback::default(),
        }
    }

    pub fn hints(mut self, hints: DecodeHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn decode_path(mut self, path: DecodePath) -> Self {
        self.decode_path = path;
        self
    }

    /// Factor applied to the UI crop rectangle around its center.
    ///
    /// Non-finite or non-positive factors are ignored.
    pub fn crop_scale(mut self, scale: f32) -> Self {
        if scale.is_finite() && scale > 0.0 {
            self.crop_scale = scale;
        }
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn feedback(mut self, feedback: Feedback) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn decode_hints(&self) -> &DecodeHints {
        &self.hints
    }

    pub fn path(&self) -> DecodePath {
        self.decode_path
    }

    pub fn crop_scale_factor(&self) -> f32 {
        self.crop_scale
    }

    pub fn shutdown_wait(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn feedback_effects(&self) -> Feedback {
        self.feedback
    }
}
