//! Bitmap and pixel types shared by the diff engine, the workers and the
//! dispatcher.
//!
//! [`TargetImage`] is the desired picture (RGBA, loaded once), while
//! [`CanvasSnapshot`] is the remote board as it was at the start of a pass
//! (RGB, fetched every pass and thrown away after diffing).

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use image::{DynamicImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ConfigError, RepaintError, Result};

// ── Rgb ──────────────────────────────────────────────────────────

/// A 24-bit colour. Written on the wire as `RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const BLACK: Rgb = Rgb([0, 0, 0]);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb([r, g, b])
    }

    /// Hex form without a leading `#`, upper-case.
    pub fn to_hex(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "{r:02X}{g:02X}{b:02X}")
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ── Pixel ────────────────────────────────────────────────────────

/// One corrective write: paint `(x, y)` with `color`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
    #[serde(rename = "rgb")]
    pub color: Rgb,
}

impl Pixel {
    pub const fn new(x: u32, y: u32, color: Rgb) -> Self {
        Self { x, y, color }
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x={}, y={}: {}", self.x, self.y, self.color)
    }
}

// ── CanvasSize ───────────────────────────────────────────────────

/// Remote canvas dimensions as reported by `get_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Length of the raw RGB buffer served by `get_pixels`.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

// ── TargetImage ──────────────────────────────────────────────────

/// The picture the canvas should converge to, and where it sits on it.
///
/// Coordinates whose alpha is zero never take part in reconciliation.
#[derive(Debug, Clone)]
pub struct TargetImage {
    image: RgbaImage,
    offset_x: u32,
    offset_y: u32,
}

impl TargetImage {
    /// Load an RGBA image from disk, placed at `(offset_x, offset_y)`.
    pub fn open(path: &Path, offset_x: u32, offset_y: u32) -> std::result::Result<Self, ConfigError> {
        let decoded = image::open(path).map_err(|source| ConfigError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?;
        match decoded {
            DynamicImage::ImageRgba8(image) => Ok(Self::new(image, offset_x, offset_y)),
            other => Err(ConfigError::NotRgba {
                path: path.to_path_buf(),
                found: format!("{:?}", other.color()),
            }),
        }
    }

    pub fn new(image: RgbaImage, offset_x: u32, offset_y: u32) -> Self {
        Self {
            image,
            offset_x,
            offset_y,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn offset(&self) -> (u32, u32) {
        (self.offset_x, self.offset_y)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Exclusive bottom-right corner of the target region in canvas space.
    pub fn extent(&self) -> (u32, u32) {
        (
            self.offset_x.saturating_add(self.width()),
            self.offset_y.saturating_add(self.height()),
        )
    }

    /// Number of coordinates with non-zero alpha.
    pub fn participating(&self) -> usize {
        self.image.pixels().filter(|p| p.0[3] != 0).count()
    }

    /// Startup check: the target region must lie inside the canvas.
    pub fn check_fits(&self, size: CanvasSize) -> std::result::Result<(), ConfigError> {
        let (end_x, end_y) = self.extent();
        if end_x > size.width || end_y > size.height {
            return Err(ConfigError::TargetTooLarge {
                target_width: self.width(),
                target_height: self.height(),
                offset_x: self.offset_x,
                offset_y: self.offset_y,
                canvas_width: size.width,
                canvas_height: size.height,
            });
        }
        Ok(())
    }
}

// ── CanvasSnapshot ───────────────────────────────────────────────

/// The remote canvas at one point in time.
#[derive(Debug, Clone)]
pub struct CanvasSnapshot {
    image: RgbImage,
}

impl CanvasSnapshot {
    /// Decode the raw `get_pixels` body: row-major RGB, 3 bytes per pixel.
    pub fn from_raw(size: CanvasSize, data: Bytes) -> Result<Self> {
        if data.len() != size.byte_len() {
            return Err(RepaintError::Decode(format!(
                "expected {} canvas bytes for {}x{}, got {}",
                size.byte_len(),
                size.width,
                size.height,
                data.len()
            )));
        }
        let image = RgbImage::from_raw(size.width, size.height, data.to_vec())
            .ok_or_else(|| RepaintError::Decode("canvas buffer does not match its size".into()))?;
        Ok(Self { image })
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    /// A canvas of one colour.
    pub fn filled(size: CanvasSize, color: Rgb) -> Self {
        Self {
            image: RgbImage::from_pixel(size.width, size.height, image::Rgb(color.0)),
        }
    }

    pub fn size(&self) -> CanvasSize {
        CanvasSize::new(self.image.width(), self.image.height())
    }

    /// Colour at `(x, y)`, or `None` outside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        self.image.get_pixel_checked(x, y).map(|p| Rgb(p.0))
    }
}

// ── Tests ────────────────────────────────────────────────────────
