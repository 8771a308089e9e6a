//! QR decode backend built on `rqrr`

use encoding_rs::{Encoding, UTF_8};
use tracing::{debug, trace};

use super::Decoder;
use crate::config::{BarcodeFormat, DecodeHints};
use crate::luminance::LuminanceImage;
use crate::{Error, Result};

/// QR code decoder.
///
/// Keeps its payload and inversion buffers between attempts so a live scan
/// does not allocate per frame; [`Decoder::reset`] clears them.
pub struct QrDecoder {
    hints: DecodeHints,
    encoding: &'static Encoding,
    payload: Vec<u8>,
    scratch: Vec<u8>,
}

impl QrDecoder {
    pub fn new(hints: DecodeHints) -> Self {
        let encoding = Encoding::for_label(hints.charset_label().as_bytes()).unwrap_or_else(|| {
            debug!(
                "unknown character set {:?}, falling back to UTF-8",
                hints.charset_label()
            );
            UTF_8
        });
        Self {
            hints,
            encoding,
            payload: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn hints(&self) -> &DecodeHints {
        &self.hints
    }
}

impl Default for QrDecoder {
    fn default() -> Self {
        Self::new(DecodeHints::default())
    }
}

impl Decoder for QrDecoder {
    fn decode(&mut self, image: &LuminanceImage) -> Result<String> {
        if !self.hints.barcode_formats().contains(BarcodeFormat::QR_CODE) {
            return Err(Error::DecodeMiss);
        }

        let (width, height) = (image.width as usize, image.height as usize);
        if let Some(text) = scan(&image.data, width, height, self.encoding, &mut self.payload) {
            return Ok(text);
        }

        if self.hints.is_try_harder() {
            self.scratch.clear();
            self.scratch.extend(image.data.iter().map(|px| !px));
            if let Some(text) = scan(&self.scratch, width, height, self.encoding, &mut self.payload)
            {
                trace!("decoded inverted image");
                return Ok(text);
            }
        }

        Err(Error::DecodeMiss)
    }

    fn reset(&mut self) {
        self.payload.clear();
        self.scratch.clear();
    }
}

/// Detect grids in `pixels` and return the first one that decodes.
fn scan(
    pixels: &[u8],
    width: usize,
    height: usize,
    encoding: &'static Encoding,
    payload: &mut Vec<u8>,
) -> Option<String> {
    if width == 0 || height == 0 || pixels.len() != width * height {
        return None;
    }

    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| pixels[y * width + x]);

    for grid in prepared.detect_grids() {
        payload.clear();
        match grid.decode_to(&mut *payload) {
            Ok(_) => {
                trace!(bytes = payload.len(), "grid decoded");
                let (text, _, _) = encoding.decode(&payload[..]);
                return Some(text.into_owned());
            }
            Err(err) => trace!("grid rejected: {err:?}"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{decode_once, DecodeOutcome};
    use image::Luma;
    use qrcode::QrCode;

    fn qr_image(data: &[u8]) -> LuminanceImage {
        let code = QrCode::new(data).expect("Failed to generate QR code");
        let img = code.render::<Luma<u8>>().quiet_zone(true).build();
        let (width, height) = img.dimensions();
        LuminanceImage::from_gray(img.into_raw(), width, height).unwrap()
    }

    #[test]
    fn test_decodes_generated_qr() {
        let mut decoder = QrDecoder::default();
        let text = decoder.decode(&qr_image(b"Hello, World!")).unwrap();
        assert_eq!(text, "Hello, World!");
    }

    #[test]
    fn test_decodes_inverted_qr_when_trying_harder() {
        let inverted = qr_image(b"inverted").inverted();

        let mut decoder = QrDecoder::new(DecodeHints::new().try_harder(true));
        assert_eq!(decoder.decode(&inverted).unwrap(), "inverted");
    }

    #[test]
    fn test_blank_image_is_a_miss() {
        let blank = LuminanceImage::from_gray(vec![255; 64 * 64], 64, 64).unwrap();
        let mut decoder = QrDecoder::default();
        assert_eq!(decoder.decode(&blank), Err(Error::DecodeMiss));
    }

    #[test]
    fn test_linear_only_hints_skip_qr() {
        let hints = DecodeHints::new().formats(BarcodeFormat::BARCODE);
        let mut decoder = QrDecoder::new(hints);
        assert_eq!(decoder.decode(&qr_image(b"x")), Err(Error::DecodeMiss));
    }

    #[test]
    fn test_unknown_charset_falls_back_to_utf8() {
        let mut decoder = QrDecoder::new(DecodeHints::new().character_set("no-such-charset"));
        assert_eq!(decoder.decode(&qr_image("héllo".as_bytes())).unwrap(), "héllo");
    }

    #[test]
    fn test_reset_gives_fresh_decoder_behaviour() {
        let hit = qr_image(b"same frame");
        let blank = LuminanceImage::from_gray(vec![0; 32 * 32], 32, 32).unwrap();

        let mut fresh = QrDecoder::default();
        let expected = decode_once(&mut fresh, &hit);
        assert_eq!(expected, DecodeOutcome::Success("same frame".to_string()));

        let mut used = QrDecoder::default();
        assert_eq!(decode_once(&mut used, &blank), DecodeOutcome::Failure);
        assert_eq!(decode_once(&mut used, &hit), expected);
        assert_eq!(decode_once(&mut used, &hit), expected);
    }
}
