use ndarray::{s, Array2};

use crate::error::{DiaError, Result};

/// A rectangle in image coordinates (0-based, x = column, y = row).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl CropRect {
    /// Centered rectangle keeping `1 - fraction` of each axis.
    ///
    /// Kept sizes round half to even. The rectangle is centred on pixel
    /// (w/2, h/2), so an odd leftover margin puts the extra pixel on the low
    /// side.
    pub fn centered(src_w: usize, src_h: usize, fraction: f64) -> Result<CropRect> {
        let keep = 1.0 - fraction;
        let width = (src_w as f64 * keep).round_ties_even() as usize;
        let height = (src_h as f64 * keep).round_ties_even() as usize;

        CropRect {
            x: src_w.saturating_sub(width).div_ceil(2),
            y: src_h.saturating_sub(height).div_ceil(2),
            width,
            height,
        }
        .validated(src_w, src_h)
    }

    /// Check that the rectangle is non-empty and lies within the source.
    pub fn validated(&self, src_w: usize, src_h: usize) -> Result<CropRect> {
        if self.width == 0 || self.height == 0 {
            return Err(DiaError::Configuration(format!(
                "trim leaves an empty image ({}x{} from {src_w}x{src_h})",
                self.width, self.height
            )));
        }

        if self.x + self.width > src_w || self.y + self.height > src_h {
            return Err(DiaError::Configuration(format!(
                "Crop region ({},{} {}x{}) exceeds source dimensions ({src_w}x{src_h})",
                self.x, self.y, self.width, self.height
            )));
        }

        Ok(*self)
    }

    /// Copy the covered pixels out of `data`.
    pub fn cutout(&self, data: &Array2<f32>) -> Array2<f32> {
        data.slice(s![
            self.y..self.y + self.height,
            self.x..self.x + self.width
        ])
        .to_owned()
    }
}
