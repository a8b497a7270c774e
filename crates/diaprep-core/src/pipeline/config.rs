use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_ASTROMETRIC_MARKER, DEFAULT_INPUT_DIR, DEFAULT_NAME_PATTERN, DEFAULT_OUTPUT_DIR,
    DEFAULT_TRIM_DIR, DEFAULT_TRIM_FRACTION, RUN_LOG_FILE_NAME,
};
use crate::engine::{EngineCommands, EngineParams};
use crate::error::{DiaError, Result};
use crate::trim::{validate_trim_fraction, DuplicateReference, TrimConfig};

/// Configuration of one run. Built once, never mutated by the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParameters {
    pub loc_data: PathBuf,
    pub loc_output: PathBuf,
    pub loc_trim: PathBuf,
    pub name_pattern: String,
    /// Fraction of each axis trimmed after registration (0.0..1.0).
    pub trimfrac: f64,
    pub wcs_ref_image: Option<PathBuf>,
    pub ref_image_list: Option<PathBuf>,
    pub min_ref_images: u32,
    pub verbose: bool,
    #[serde(rename = "use_GPU")]
    pub use_gpu: bool,
    /// File-name substring that marks an image with survey-grade astrometry.
    pub astrometric_marker: String,
    pub duplicate_reference: DuplicateReference,
    /// Rewrite trimmed images even when they already exist.
    pub overwrite_trimmed: bool,
    /// Stop after a registration failure instead of subtracting untrimmed images.
    pub fail_fast: bool,
    pub engine_commands: EngineCommands,
    pub engine: EngineParams,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            loc_data: PathBuf::from(DEFAULT_INPUT_DIR),
            loc_output: PathBuf::from(DEFAULT_OUTPUT_DIR),
            loc_trim: PathBuf::from(DEFAULT_TRIM_DIR),
            name_pattern: DEFAULT_NAME_PATTERN.to_string(),
            trimfrac: DEFAULT_TRIM_FRACTION,
            wcs_ref_image: None,
            ref_image_list: None,
            min_ref_images: 1,
            verbose: false,
            use_gpu: false,
            astrometric_marker: DEFAULT_ASTROMETRIC_MARKER.to_string(),
            duplicate_reference: DuplicateReference::default(),
            overwrite_trimmed: false,
            fail_fast: false,
            engine_commands: EngineCommands::default(),
            engine: EngineParams::default(),
        }
    }
}

impl RunParameters {
    pub fn validate(&self) -> Result<()> {
        validate_trim_fraction(self.trimfrac)?;
        if self.name_pattern.trim().is_empty() {
            return Err(DiaError::Configuration("name_pattern must not be empty".into()));
        }
        if self.min_ref_images == 0 {
            return Err(DiaError::Configuration("min_ref_images must be at least 1".into()));
        }
        if comparable(&self.loc_trim) == comparable(&self.loc_data) {
            return Err(DiaError::Configuration(format!(
                "trim directory {} must differ from the input directory",
                self.loc_trim.display()
            )));
        }
        if self.engine_commands.cpu.program.is_empty() || self.engine_commands.gpu.program.is_empty() {
            return Err(DiaError::Configuration("engine command must not be empty".into()));
        }
        Ok(())
    }

    pub fn trim_config(&self) -> TrimConfig {
        TrimConfig {
            fraction: self.trimfrac,
            trim_dir: self.loc_trim.clone(),
            duplicates: self.duplicate_reference,
            overwrite: self.overwrite_trimmed,
        }
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.loc_output.join(RUN_LOG_FILE_NAME)
    }
}

/// Canonical path when it exists, otherwise the path without `.` components.
fn comparable(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| {
        path.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_lcogt_driver() {
        let params = RunParameters::default();
        assert_eq!(params.trimfrac, 0.4);
        assert_eq!(params.min_ref_images, 1);
        assert!(!params.use_gpu);
        assert!(!params.engine.do_photometry);
        assert_eq!(params.engine.psf_fit_radius, 5.0);
        assert!(params.engine.use_stamps);
        assert_eq!(params.engine.nstamps, 50);
        assert!(params.engine.subtract_sky);
        assert_eq!(params.engine.pixel_min, 0.0);
        assert_eq!(params.engine.pixel_max, 50000.0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut params = RunParameters {
            trimfrac: 1.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        params.trimfrac = 0.2;
        params.name_pattern = " ".into();
        assert!(params.validate().is_err());

        params.name_pattern = "*.fits".into();
        params.loc_trim = params.loc_data.clone();
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_trim_dir_spelled_differently_is_still_the_input_dir() {
        let params = RunParameters {
            loc_data: PathBuf::from("./DIA_IN"),
            loc_trim: PathBuf::from("DIA_IN/"),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in");
        fs::create_dir_all(input.join("sub")).unwrap();
        let params = RunParameters {
            loc_data: input.clone(),
            loc_trim: input.join("sub").join(".."),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = RunParameters {
            loc_data: input.clone(),
            loc_trim: input.join("sub"),
            ..Default::default()
        };
        assert!(params.validate().is_ok());
    }
}
