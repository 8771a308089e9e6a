//! Camera frames and scan-region geometry
//!
//! A [`Frame`] is produced once per capture request and moved into the decode
//! worker for exactly one attempt. The [`ScanRegion`] it is decoded against
//! is derived from the crop rectangle reported by the UI and cached for the
//! rest of the session.

use crate::{Error, Result};

/// Pixel layout of a camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFormat {
    /// 8-bit grayscale, one byte per pixel
    #[default]
    Luma8,
    /// YUV 4:2:0 semi-planar: full Y plane followed by interleaved VU
    Nv21,
}

impl FrameFormat {
    /// Number of bytes a `width` x `height` frame occupies in this layout.
    ///
    /// Returns `None` if the size overflows.
    pub fn expected_len(self, width: u32, height: u32) -> Option<usize> {
        let luma = (width as usize).checked_mul(height as usize)?;
        match self {
            FrameFormat::Luma8 => Some(luma),
            FrameFormat::Nv21 => {
                let chroma_w = (width as usize).div_ceil(2);
                let chroma_h = (height as usize).div_ceil(2);
                let chroma = chroma_w.checked_mul(chroma_h)?.checked_mul(2)?;
                luma.checked_add(chroma)
            }
        }
    }
}

/// Raw frame delivered by a frame source.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
}

impl Frame {
    /// Create a grayscale frame.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self::with_format(data, width, height, FrameFormat::Luma8)
    }

    pub fn with_format(data: Vec<u8>, width: u32, height: u32, format: FrameFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }

    /// Check that the buffer length matches the declared geometry.
    pub fn validate(&self) -> Result<()> {
        let expected = self
            .format
            .expected_len(self.width, self.height)
            .ok_or_else(|| Error::malformed("frame dimensions overflow"))?;
        if self.data.len() != expected {
            return Err(Error::malformed(format!(
                "{}x{} {:?} frame needs {expected} bytes, got {}",
                self.width,
                self.height,
                self.format,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// The Y (luminance) plane of the frame.
    ///
    /// Only meaningful after [`Frame::validate`] succeeded.
    pub fn luma_plane(&self) -> &[u8] {
        let len = (self.width as usize) * (self.height as usize);
        &self.data[..len.min(self.data.len())]
    }

    /// Frame bounds as a rectangle at the origin.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Signed rectangle in UI or frame coordinates.
///
/// `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_xywh(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self::new(
            left,
            top,
            left.saturating_add(width),
            top.saturating_add(height),
        )
    }

    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn center_x(&self) -> i32 {
        ((self.left as i64 + self.right as i64) / 2) as i32
    }

    pub fn center_y(&self) -> i32 {
        ((self.top as i64 + self.bottom as i64) / 2) as i32
    }

    /// Move the rectangle by `(dx, dy)`.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.left.saturating_add(dx),
            self.top.saturating_add(dy),
            self.right.saturating_add(dx),
            self.bottom.saturating_add(dy),
        )
    }

    /// Scale width and height by `scale`, keeping the center fixed.
    pub fn zoom(&self, scale: f32) -> Self {
        let new_w = (self.width() as f32 * scale) as i32;
        let new_h = (self.height() as f32 * scale) as i32;
        let cx = self.center_x();
        let cy = self.center_y();
        Self::new(
            cx.saturating_sub(new_w / 2),
            cy.saturating_sub(new_h / 2),
            cx.saturating_add(new_w / 2),
            cy.saturating_add(new_h / 2),
        )
    }

    /// Overlap with `other`, or `None` if they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let clipped = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        (!clipped.is_empty()).then_some(clipped)
    }
}

/// Sub-area of a frame handed to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl ScanRegion {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// The whole frame at zero offset.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Derive the region from a crop rectangle reported by the UI.
    ///
    /// The crop is enlarged by `scale` around its center and clipped to the
    /// frame. Returns `None` when nothing of the crop lies inside the frame.
    pub fn from_crop(crop: Rect, scale: f32, frame_width: u32, frame_height: u32) -> Option<Self> {
        let bounds = Rect::new(
            0,
            0,
            frame_width.min(i32::MAX as u32) as i32,
            frame_height.min(i32::MAX as u32) as i32,
        );
        let clipped = crop.zoom(scale).intersect(&bounds)?;
        Some(Self::new(
            clipped.left as u32,
            clipped.top as u32,
            clipped.width() as u32,
            clipped.height() as u32,
        ))
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn right(&self) -> u64 {
        self.left as u64 + self.width as u64
    }

    pub fn bottom(&self) -> u64 {
        self.top as u64 + self.height as u64
    }

    /// Whether the region lies entirely inside a `width` x `height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }
}

/// Rotate a landscape `width` x `height` buffer into portrait.
///
/// Source pixel `(x, y)` lands at `x * height + (height - y - 1)`; the result
/// is `height` pixels wide and `width` pixels tall.
pub fn rotate_to_portrait(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    check_len(data, w, h)?;

    let mut rotated = vec![0u8; data.len()];
    for y in 0..h {
        let row = &data[y * w..(y + 1) * w];
        for (x, &px) in row.iter().enumerate() {
            rotated[x * h + (h - y - 1)] = px;
        }
    }
    Ok(rotated)
}

/// Inverse of [`rotate_to_portrait`] for a `width` x `height` portrait buffer.
pub fn rotate_to_landscape(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    check_len(data, w, h)?;

    let mut rotated = vec![0u8; data.len()];
    for py in 0..h {
        for px in 0..w {
            rotated[(w - px - 1) * h + py] = data[py * w + px];
        }
    }
    Ok(rotated)
}

fn check_len(data: &[u8], w: usize, h: usize) -> Result<()> {
    match w.checked_mul(h) {
        Some(len) if len == data.len() => Ok(()),
        _ => Err(Error::malformed(format!(
            "{w}x{h} buffer needs {} bytes, got {}",
            w.saturating_mul(h),
            data.len()
        ))),
    }
}
