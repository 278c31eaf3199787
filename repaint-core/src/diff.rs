//! Pixel-level diffing between the target image and a canvas snapshot.
//!
//! Walks the target region, compares every opaque target pixel against the
//! canvas and collects the mismatches into a [`WorkQueue`]. Transparent
//! target pixels are "don't care" and are never queued.

use rand::Rng;

use crate::canvas::{CanvasSnapshot, Pixel, Rgb, TargetImage};
use crate::error::{RepaintError, Result};

// ── Diff ─────────────────────────────────────────────────────────

/// Produce the corrective writes needed to make `canvas` match `target`.
///
/// The target is read at its configured offset; everything outside the
/// target region is ignored. Fails only if the snapshot cannot contain the
/// target region at all.
pub fn diff(target: &TargetImage, canvas: &CanvasSnapshot) -> Result<WorkQueue> {
    let size = canvas.size();
    let (need_x, need_y) = target.extent();
    if need_x > size.width || need_y > size.height {
        return Err(RepaintError::CanvasTooSmall {
            width: size.width,
            height: size.height,
            need_x,
            need_y,
        });
    }

    let (off_x, off_y) = target.offset();
    let mut pixels = Vec::new();

    for (x, y, px) in target.image().enumerate_pixels() {
        let [r, g, b, a] = px.0;
        if a == 0 {
            continue;
        }
        let want = Rgb::new(r, g, b);
        let (cx, cy) = (off_x + x, off_y + y);
        if canvas.pixel(cx, cy) != Some(want) {
            pixels.push(Pixel::new(cx, cy, want));
        }
    }

    Ok(WorkQueue::from(pixels))
}

// ── WorkQueue ────────────────────────────────────────────────────

/// Pending writes of a single pass.
///
/// Unordered: the only way out is [`pop_random`](Self::pop_random), which
/// removes an element chosen uniformly at random.
#[derive(Debug, Clone, Default)]
pub struct WorkQueue {
    pixels: Vec<Pixel>,
}

impl WorkQueue {
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Remove and return a uniformly chosen pixel.
    pub fn pop_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Pixel> {
        if self.pixels.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..self.pixels.len());
        Some(self.pixels.swap_remove(index))
    }

    /// Read-only view, in no particular order.
    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }
}

impl From<Vec<Pixel>> for WorkQueue {
    fn from(pixels: Vec<Pixel>) -> Self {
        Self { pixels }
    }
}

// ── Tests ────────────────────────────────────────────────────────
