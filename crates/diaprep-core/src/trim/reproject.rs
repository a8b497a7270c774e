use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{DiaError, Result};
use crate::wcs::Wcs;

/// Resamples an image from its own WCS onto a target pixel grid.
///
/// Pixels of the target grid that fall outside the source footprint are NaN.
pub trait Reprojector: Send + Sync {
    fn name(&self) -> &str;

    /// `shape` is `(rows, cols)` of the target grid.
    fn reproject(
        &self,
        data: &Array2<f32>,
        source: &Wcs,
        target: &Wcs,
        shape: (usize, usize),
    ) -> Result<Array2<f32>>;
}

/// Bilinear interpolation through sky coordinates.
#[derive(Clone, Copy, Debug, Default)]
pub struct BilinearReprojector;

impl Reprojector for BilinearReprojector {
    fn name(&self) -> &str {
        "bilinear"
    }

    fn reproject(
        &self,
        data: &Array2<f32>,
        source: &Wcs,
        target: &Wcs,
        shape: (usize, usize),
    ) -> Result<Array2<f32>> {
        if source == target && data.dim() == shape {
            return Ok(data.clone());
        }

        let (h, w) = shape;
        let sample_row = |row: usize| -> Vec<f32> {
            (0..w)
                .map(|col| {
                    let (ra, dec) = target.pixel_to_sky(col as f64, row as f64);
                    match source.sky_to_pixel(ra, dec) {
                        Some((sx, sy)) => bilinear_sample(data, sy, sx),
                        None => f32::NAN,
                    }
                })
                .collect()
        };

        let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
            (0..h).into_par_iter().map(sample_row).collect()
        } else {
            (0..h).map(sample_row).collect()
        };

        let pixels: Vec<f32> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec(shape, pixels)
            .map_err(|e| DiaError::InvalidFits(format!("reprojected buffer shape: {e}")))
    }
}

/// Bilinear sample at 0-based `(y, x)`.
///
/// Positions more than half a pixel outside the array are NaN. Neighbours
/// past the edge are clamped, and zero-weight neighbours never contribute.
pub fn bilinear_sample(data: &Array2<f32>, y: f64, x: f64) -> f32 {
    let (h, w) = data.dim();
    if h == 0 || w == 0 || !x.is_finite() || !y.is_finite() {
        return f32::NAN;
    }
    if x < -0.5 || y < -0.5 || x > w as f64 - 0.5 || y > h as f64 - 0.5 {
        return f32::NAN;
    }

    let x = x.clamp(0.0, (w - 1) as f64);
    let y = y.clamp(0.0, (h - 1) as f64);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let taps = [
        (y0, x0, (1.0 - fx) * (1.0 - fy)),
        (y0, x1, fx * (1.0 - fy)),
        (y1, x0, (1.0 - fx) * fy),
        (y1, x1, fx * fy),
    ];
    let mut acc = 0.0f64;
    for (r, c, weight) in taps {
        if weight > 0.0 {
            acc += data[[r, c]] as f64 * weight;
        }
    }
    acc as f32
}
