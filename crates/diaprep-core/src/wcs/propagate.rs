use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::consts::DIFF_IMAGE_PREFIX;
use crate::error::{DiaError, Result};
use crate::io::{read_fits_header, update_header_in_place};
use crate::select::{list_matching, read_reference_list};

use super::model::Wcs;

/// Where a WCS for the difference images may come from, in priority order.
#[derive(Clone, Debug, Default)]
pub struct WcsSourceCandidates {
    /// Single photometric reference image (REF directory).
    pub reference_image: Option<PathBuf>,
    /// Reference list file; its first existing entry is used.
    pub reference_list: Option<PathBuf>,
    /// Trimmed WCS reference image, used when nothing else resolves.
    pub fallback: Option<PathBuf>,
}

/// Outcome of a propagation pass.
#[derive(Clone, Debug, Default)]
pub struct PropagationReport {
    pub source: Option<PathBuf>,
    pub updated: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
}

/// Pick the first existing WCS source.
pub fn resolve_wcs_source(candidates: &WcsSourceCandidates) -> Option<PathBuf> {
    if let Some(ref image) = candidates.reference_image {
        if image.is_file() {
            return Some(image.clone());
        }
    }
    if let Some(ref list) = candidates.reference_list {
        if list.is_file() {
            match read_reference_list(list) {
                Ok(entries) => {
                    if let Some(first) = entries.into_iter().next().filter(|p| p.is_file()) {
                        return Some(first);
                    }
                }
                Err(e) => warn!(list = %list.display(), error = %e, "Cannot read reference list"),
            }
        }
    }
    candidates.fallback.clone().filter(|p| p.is_file())
}

/// Copy the WCS of `source` into every `d_*` image in `output_dir`.
///
/// A missing source is not an error: a warning is emitted and nothing is touched.
/// Per-image failures are collected in the report rather than aborting the pass.
pub fn propagate_wcs(source: Option<&Path>, output_dir: &Path) -> Result<PropagationReport> {
    let Some(source) = source else {
        warn!("No reference image found for copying WCS to difference images");
        return Ok(PropagationReport::default());
    };

    let wcs = read_fits_header(source)
        .and_then(|h| Wcs::from_header(&h))
        .map_err(|e| DiaError::WcsPropagation {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;

    let pattern = format!("{DIFF_IMAGE_PREFIX}*");
    let diff_images = list_matching(output_dir, &pattern)?;
    info!(
        source = %source.display(),
        count = diff_images.len(),
        "Propagating WCS to difference images"
    );

    let mut report = PropagationReport {
        source: Some(source.to_path_buf()),
        ..Default::default()
    };
    for diff in diff_images {
        match update_header_in_place(&diff, |header| {
            wcs.apply_to(header);
            Ok(())
        }) {
            Ok(_) => {
                debug!(image = %diff.display(), "WCS updated");
                report.updated.push(diff);
            }
            Err(e) => {
                let err = DiaError::WcsPropagation {
                    path: diff.clone(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Skipping difference image");
                report.failures.push((diff, err.to_string()));
            }
        }
    }
    Ok(report)
}
