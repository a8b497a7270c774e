use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_REF_LIST_NAME, FITS_EXTENSION, REF_SUBDIR, TRIM_SUFFIX};
use crate::error::{DiaError, Result};
use crate::pipeline::config::RunParameters;
use crate::trim::trimmed_path;

use super::discover::{discover_input_images, list_matching};

/// Photometric reference images taken from the `REF` subdirectory.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceSet {
    pub images: Vec<PathBuf>,
    /// First image of the set, used as the single photometric reference.
    pub primary: PathBuf,
    pub list_file: PathBuf,
    /// Whether the list file was created by this run.
    pub list_written: bool,
}

/// Everything the INIT phase resolves about inputs and references.
#[derive(Clone, Debug)]
pub struct ReferenceSelection {
    /// Input images in discovery order.
    pub images: Vec<PathBuf>,
    /// Image whose pixel grid every other image is reprojected onto.
    pub wcs_reference: PathBuf,
    /// True when the WCS reference came from the configuration, not the heuristic.
    pub wcs_reference_explicit: bool,
    pub photometric: Option<ReferenceSet>,
    /// Reference list file handed to the subtraction engine, if any.
    pub ref_image_list: Option<PathBuf>,
}

/// Choose the WCS reference among `images`.
///
/// Heuristic, not a quality metric: an image whose file name contains `marker`
/// (case-insensitive) is assumed to carry survey-grade astrometry. When several
/// names match, the last one in discovery order wins. Without a match the first
/// image is used. Returns `None` only for an empty list.
pub fn select_wcs_reference<'a>(images: &'a [PathBuf], marker: &str) -> Option<&'a PathBuf> {
    let marker = marker.to_lowercase();
    let marked = if marker.is_empty() {
        None
    } else {
        images.iter().rev().find(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().to_lowercase().contains(&marker))
                .unwrap_or(false)
        })
    };
    marked.or_else(|| images.first())
}

/// Resolve the photometric reference set from `<loc_data>/REF`.
///
/// When the directory exists and `list_file` does not, the list is created
/// with every REF image, newline-joined.
pub fn resolve_reference_set(loc_data: &Path, list_file: &Path) -> Result<Option<ReferenceSet>> {
    let ref_dir = loc_data.join(REF_SUBDIR);
    if !ref_dir.is_dir() {
        return Ok(None);
    }

    let images = list_matching(&ref_dir, &format!("*{FITS_EXTENSION}"))?;
    let Some(primary) = images.first().cloned() else {
        warn!(dir = %ref_dir.display(), "REF directory holds no FITS images; ignoring it");
        return Ok(None);
    };

    let list_written = if list_file.exists() {
        false
    } else {
        write_reference_list(list_file, &images)?;
        info!(list = %list_file.display(), count = images.len(), "Wrote reference image list");
        true
    };

    Ok(Some(ReferenceSet {
        images,
        primary,
        list_file: list_file.to_path_buf(),
        list_written,
    }))
}

/// Run the selection phase for `params`: discovery, WCS reference, REF set.
pub fn select_references(params: &RunParameters) -> Result<ReferenceSelection> {
    let images = discover_input_images(&params.loc_data, &params.name_pattern)?;
    debug!(count = images.len(), "Discovered input images");

    let (wcs_reference, explicit) = match params.wcs_ref_image {
        Some(ref path) => {
            if !path.is_file() {
                return Err(DiaError::ReferenceImage {
                    path: path.clone(),
                    reason: "file does not exist".into(),
                });
            }
            (path.clone(), true)
        }
        None => {
            let chosen = select_wcs_reference(&images, &params.astrometric_marker)
                .cloned()
                .ok_or_else(|| DiaError::NoInputImages {
                    dir: params.loc_data.clone(),
                    pattern: params.name_pattern.clone(),
                })?;
            info!(reference = %chosen.display(), "Selected WCS reference image");
            (chosen, false)
        }
    };

    let default_list = params.loc_output.join(DEFAULT_REF_LIST_NAME);
    let list_file = params.ref_image_list.clone().unwrap_or(default_list);
    let photometric = resolve_reference_set(&params.loc_data, &list_file)?;

    let ref_image_list = match (&photometric, &params.ref_image_list) {
        (Some(set), _) => Some(set.list_file.clone()),
        (None, Some(configured)) => Some(configured.clone()),
        (None, None) => None,
    };

    Ok(ReferenceSelection {
        images,
        wcs_reference,
        wcs_reference_explicit: explicit,
        photometric,
        ref_image_list,
    })
}

pub fn write_reference_list(path: &Path, images: &[PathBuf]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let body = images
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(path, body)?;
    Ok(())
}

/// Read a newline-separated list of image paths, skipping blank lines.
pub fn read_reference_list(path: &Path) -> Result<Vec<PathBuf>> {
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Result of pointing a reference list at trimmed images.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListRewrite {
    pub kept: Vec<PathBuf>,
    pub dropped: Vec<PathBuf>,
}

/// Rewrite `list` so each entry names its trimmed counterpart in `trim_dir`.
///
/// Entries without a trimmed counterpart are dropped with a warning. Entries
/// that already are trimmed images are kept as they are. A missing list file
/// is left alone.
pub fn rewrite_reference_list(list: &Path, trim_dir: &Path) -> Result<ListRewrite> {
    if !list.is_file() {
        return Ok(ListRewrite::default());
    }

    let mut outcome = ListRewrite::default();
    for entry in read_reference_list(list)? {
        let already_trimmed = entry
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(TRIM_SUFFIX));
        let candidate = if already_trimmed {
            entry.clone()
        } else {
            trimmed_path(&entry, trim_dir)
        };
        if candidate.is_file() {
            outcome.kept.push(candidate);
        } else {
            warn!(missing = %candidate.display(), "Missing trimmed image from reference list");
            outcome.dropped.push(entry);
        }
    }

    write_reference_list(list, &outcome.kept)?;
    Ok(outcome)
}
