//! One-shot decoding of still images
//!
//! Used for images picked from storage rather than the live camera: no
//! session, no worker thread, the whole image is decoded as-is.

use tracing::debug;

#[cfg(feature = "qr")]
use crate::config::ScanConfig;
use crate::decoder::{decode_once, Decoder};
use crate::luminance::LuminanceImage;

/// Decode a QR code from an 8-bit grayscale image with default hints.
///
/// Returns the decoded text, or an empty string if nothing was found or the
/// buffer does not hold `width * height` bytes.
///
/// ```
/// assert_eq!(qrcapture::decode_static_image(&[0; 10], 4, 4), "");
/// ```
#[cfg(feature = "qr")]
pub fn decode_static_image(data: &[u8], width: u32, height: u32) -> String {
    decode_static_image_with(&ScanConfig::new(), data, width, height)
}

/// [`decode_static_image`] using the hints from `config`.
#[cfg(feature = "qr")]
pub fn decode_static_image_with(config: &ScanConfig, data: &[u8], width: u32, height: u32) -> String {
    let mut decoder = crate::decoder::qr::QrDecoder::new(config.decode_hints().clone());
    decode_static_with(&mut decoder, data, width, height)
}

/// Decode a still image with a caller-supplied decoder.
pub fn decode_static_with<D: Decoder + ?Sized>(
    decoder: &mut D,
    data: &[u8],
    width: u32,
    height: u32,
) -> String {
    match LuminanceImage::from_gray(data.to_vec(), width, height) {
        Ok(image) => decode_once(decoder, &image).into_text(),
        Err(err) => {
            debug!("not decoding still image: {err}");
            String::new()
        }
    }
}
