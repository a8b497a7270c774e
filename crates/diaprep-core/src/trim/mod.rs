//! Registration and trimming: reproject every image onto the WCS reference
//! grid, then cut the central region out of it.

pub mod cutout;
pub mod reproject;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_TRIM_FRACTION, DEFAULT_TRIM_DIR, FITS_EXTENSION, TRIM_SUFFIX};
use crate::error::{DiaError, Result};
use crate::io::{read_fits, write_fits, FitsHeader};
use crate::pipeline::{PipelineStage, ProgressReporter};
use crate::wcs::Wcs;

pub use cutout::CropRect;
pub use reproject::{bilinear_sample, BilinearReprojector, Reprojector};

/// What to do when the WCS reference also appears among the input images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReference {
    /// Process it once, as the reference.
    #[default]
    Deduplicate,
    /// Process it as the reference and again as an ordinary input.
    ProcessTwice,
}

#[derive(Clone, Debug)]
pub struct TrimConfig {
    /// Fraction of each axis removed, in `[0, 1)`.
    pub fraction: f64,
    pub trim_dir: PathBuf,
    pub duplicates: DuplicateReference,
    /// Rewrite trimmed images that already exist instead of reusing them.
    pub overwrite: bool,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            fraction: DEFAULT_TRIM_FRACTION,
            trim_dir: PathBuf::from(DEFAULT_TRIM_DIR),
            duplicates: DuplicateReference::default(),
            overwrite: false,
        }
    }
}

/// Trimmed images in processing order. The last entry is the trimmed WCS reference.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrimmedImageSet {
    paths: Vec<PathBuf>,
}

impl TrimmedImageSet {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn reference(&self) -> Option<&Path> {
        self.paths.last().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.paths
    }
}

/// Trimmed file name for `name`: a trailing `.fits` in any case becomes
/// `_trim.fits`, any other name gets `_trim.fits` appended.
///
/// Applied to a glob it yields the pattern matching the trimmed files.
pub fn trimmed_name(name: &str) -> String {
    let split = name.len().saturating_sub(FITS_EXTENSION.len());
    let stem = match name.get(split..) {
        Some(ext) if ext.eq_ignore_ascii_case(FITS_EXTENSION) => &name[..split],
        _ => name,
    };
    format!("{stem}{TRIM_SUFFIX}")
}

/// Path of the trimmed counterpart of `image`: `<trim_dir>/<stem>_trim.fits`.
pub fn trimmed_path(image: &Path, trim_dir: &Path) -> PathBuf {
    let name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    trim_dir.join(trimmed_name(&name))
}

pub fn validate_trim_fraction(fraction: f64) -> Result<()> {
    if (0.0..1.0).contains(&fraction) {
        Ok(())
    } else {
        Err(DiaError::Configuration(format!(
            "trim fraction must be in [0, 1), got {fraction}"
        )))
    }
}

/// Reproject each image onto the grid of `wcs_reference` and keep the central
/// `1 - fraction` of each axis.
///
/// The reference itself is processed last. Output files carry the source
/// header with the cropped reference WCS merged in. An existing output is
/// reused unless `config.overwrite` is set or it does not read back with the
/// cropped dimensions.
pub fn spin_and_trim(
    images: &[PathBuf],
    wcs_reference: &Path,
    config: &TrimConfig,
    reprojector: &dyn Reprojector,
    reporter: &dyn ProgressReporter,
) -> Result<TrimmedImageSet> {
    validate_trim_fraction(config.fraction)?;

    let reference = read_fits(wcs_reference).map_err(|e| DiaError::ReferenceImage {
        path: wcs_reference.to_path_buf(),
        reason: e.to_string(),
    })?;
    let target_wcs = Wcs::from_header(&reference.header).map_err(|e| DiaError::ReferenceImage {
        path: wcs_reference.to_path_buf(),
        reason: e.to_string(),
    })?;
    let shape = reference.data.dim();
    let crop = CropRect::centered(reference.width(), reference.height(), config.fraction)?;
    let cropped_wcs = target_wcs.cropped(crop.x, crop.y);

    let work = processing_order(images, wcs_reference, config.duplicates);
    fs::create_dir_all(&config.trim_dir)?;
    info!(
        reference = %wcs_reference.display(),
        images = work.len(),
        fraction = config.fraction,
        width = crop.width,
        height = crop.height,
        reprojector = reprojector.name(),
        "Registering and trimming"
    );

    reporter.begin_stage(PipelineStage::Registering, Some(work.len()));
    let mut trimmed = Vec::with_capacity(work.len());
    for (i, image) in work.iter().enumerate() {
        let out_path = trimmed_path(image, &config.trim_dir);
        if !config.overwrite && reusable(&out_path, &crop) {
            debug!(image = %out_path.display(), "Trimmed image exists; reusing it");
        } else {
            let (header, data) = if image.as_path() == wcs_reference {
                (reference.header.clone(), crop.cutout(&reference.data))
            } else {
                let source = read_fits(image).map_err(|e| registration_error(image, e))?;
                let source_wcs =
                    Wcs::from_header(&source.header).map_err(|e| registration_error(image, e))?;
                let aligned = reprojector
                    .reproject(&source.data, &source_wcs, &target_wcs, shape)
                    .map_err(|e| registration_error(image, e))?;
                if aligned.iter().all(|v| v.is_nan()) {
                    warn!(image = %image.display(), "Image does not overlap the reference footprint");
                }
                (source.header, crop.cutout(&aligned))
            };
            write_trimmed(&out_path, header, &cropped_wcs, &data)
                .map_err(|e| registration_error(image, e))?;
            debug!(source = %image.display(), output = %out_path.display(), "Trimmed");
        }
        trimmed.push(out_path);
        reporter.advance(i + 1);
    }
    reporter.finish_stage();

    Ok(TrimmedImageSet::new(trimmed))
}

/// Inputs in order, then the reference.
fn processing_order(
    images: &[PathBuf],
    wcs_reference: &Path,
    duplicates: DuplicateReference,
) -> Vec<PathBuf> {
    let mut order = match duplicates {
        DuplicateReference::ProcessTwice => images.to_vec(),
        DuplicateReference::Deduplicate => {
            let mut seen: HashSet<PathBuf> = HashSet::new();
            seen.insert(canonical(wcs_reference));
            images
                .iter()
                .filter(|image| seen.insert(canonical(image)))
                .cloned()
                .collect()
        }
    };
    order.push(wcs_reference.to_path_buf());
    order
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// An existing trimmed image is only trusted when it is readable and has the
/// crop's dimensions.
fn reusable(path: &Path, crop: &CropRect) -> bool {
    if !path.exists() {
        return false;
    }
    match read_fits(path) {
        Ok(image) if image.data.dim() == (crop.height, crop.width) => true,
        Ok(image) => {
            warn!(
                image = %path.display(),
                width = image.width(),
                height = image.height(),
                "Existing trimmed image has the wrong size; rewriting it"
            );
            false
        }
        Err(e) => {
            warn!(image = %path.display(), error = %e, "Existing trimmed image is unreadable; rewriting it");
            false
        }
    }
}

fn write_trimmed(path: &Path, mut header: FitsHeader, wcs: &Wcs, data: &Array2<f32>) -> Result<()> {
    wcs.apply_to(&mut header);
    write_fits(path, &header, data)
}

fn registration_error(path: &Path, err: DiaError) -> DiaError {
    DiaError::Registration {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
