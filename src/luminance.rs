//! Luminance extraction
//!
//! Turns a raw [`Frame`] plus an optional [`ScanRegion`] into the 8-bit
//! grayscale image handed to the decode primitive.

use crate::config::DecodePath;
use crate::frame::{rotate_to_portrait, Frame, ScanRegion};
use crate::{Error, Result};

/// Row-major 8-bit luminance image.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct LuminanceImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl LuminanceImage {
    /// Wrap an existing grayscale buffer.
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        if (data.len() as u64) != (width as u64) * (height as u64) {
            return Err(Error::malformed(format!(
                "{width}x{height} luminance image needs {} bytes, got {}",
                width as u64 * height as u64,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Copy `region` out of the frame's Y plane, in sensor byte order.
    ///
    /// With no region the full frame is used at zero offset. Fails on a
    /// malformed frame, a zero-area region, or a region that leaves the
    /// frame; nothing outside `[0, width) x [0, height)` is ever read.
    pub fn crop(frame: &Frame, region: Option<ScanRegion>) -> Result<Self> {
        frame.validate()?;
        let region = region.unwrap_or_else(|| ScanRegion::full(frame.width, frame.height));
        if region.area() == 0 {
            return Err(Error::malformed("scan region has zero area"));
        }
        if !region.fits_within(frame.width, frame.height) {
            return Err(Error::malformed(format!(
                "scan region {region:?} exceeds {}x{} frame",
                frame.width, frame.height
            )));
        }

        let luma = frame.luma_plane();
        let stride = frame.width as usize;
        let (left, top) = (region.left as usize, region.top as usize);
        let (w, h) = (region.width as usize, region.height as usize);

        let mut data = Vec::with_capacity(w * h);
        for row in luma.chunks_exact(stride).skip(top).take(h) {
            data.extend_from_slice(&row[left..left + w]);
        }

        Ok(Self {
            width: region.width,
            height: region.height,
            data,
        })
    }

    /// Rotate a landscape frame to portrait and use all of it.
    pub fn portrait(frame: &Frame) -> Result<Self> {
        frame.validate()?;
        if frame.width == 0 || frame.height == 0 {
            return Err(Error::malformed("frame has zero area"));
        }
        let rotated = rotate_to_portrait(frame.luma_plane(), frame.width, frame.height)?;
        Self::from_gray(rotated, frame.height, frame.width)
    }

    /// Build the luminance image for one decode attempt.
    pub fn for_path(frame: &Frame, path: DecodePath, region: Option<ScanRegion>) -> Result<Self> {
        match path {
            DecodePath::Cropped => Self::crop(frame, region),
            DecodePath::FullFrame => Self::portrait(frame),
        }
    }

    /// Copy of the image with every pixel inverted.
    pub fn inverted(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|px| !px).collect(),
        }
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width as usize + x]
    }
}

impl std::fmt::Debug for LuminanceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuminanceImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}
