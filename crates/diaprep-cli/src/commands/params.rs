use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use diaprep_core::consts::DEFAULT_REF_LIST_NAME;
use diaprep_core::engine::{EngineParams, FlagValue};
use diaprep_core::pipeline::RunParameters;
use diaprep_core::trim::DuplicateReference;

/// Directory and reference options shared by `select`, `trim` and `run`.
#[derive(Args)]
pub struct ParamArgs {
    /// Run config file (TOML); flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding the input images
    #[arg(short = 'i', long = "loc_data")]
    pub loc_data: Option<PathBuf>,

    /// Directory for difference images and the run log
    #[arg(short = 'o', long = "loc_output")]
    pub loc_output: Option<PathBuf>,

    /// Directory for registered and trimmed images
    #[arg(short = 't', long = "loc_trim")]
    pub loc_trim: Option<PathBuf>,

    /// Glob selecting input images
    #[arg(long = "name_pattern")]
    pub name_pattern: Option<String>,

    /// Fraction of each axis trimmed after registration (0.0..1.0)
    #[arg(long)]
    pub trimfrac: Option<f64>,

    /// Image whose pixel grid all inputs are registered onto
    #[arg(long = "wcs_ref_image")]
    pub wcs_ref_image: Option<PathBuf>,

    /// Newline-separated list of photometric reference images
    #[arg(long = "ref_image_list")]
    pub ref_image_list: Option<PathBuf>,

    /// Minimum number of reference images the engine must combine
    #[arg(long = "min_ref_images")]
    pub min_ref_images: Option<u32>,

    /// Use the GPU engine (True or False)
    #[arg(long = "use_GPU", value_parser = parse_flag_bool)]
    pub use_gpu: Option<bool>,

    /// File-name marker of images with survey-grade astrometry
    #[arg(long)]
    pub marker: Option<String>,

    /// Register the WCS reference twice when it is also an input
    #[arg(long)]
    pub no_dedup: bool,

    /// Stop after a registration failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Rewrite trimmed images that already exist
    #[arg(long)]
    pub overwrite: bool,
}

impl ParamArgs {
    /// Build run parameters: defaults, then the config file, then flags.
    pub fn to_params(&self, verbose: bool) -> Result<RunParameters> {
        let mut params = match self.config {
            Some(ref path) => load_config(path)?,
            None => RunParameters::default(),
        };

        if let Some(ref dir) = self.loc_data {
            params.loc_data = dir.clone();
        }
        if let Some(ref dir) = self.loc_output {
            params.loc_output = dir.clone();
        }
        if let Some(ref dir) = self.loc_trim {
            params.loc_trim = dir.clone();
        }
        if let Some(ref pattern) = self.name_pattern {
            params.name_pattern = pattern.clone();
        }
        if let Some(fraction) = self.trimfrac {
            params.trimfrac = fraction;
        }
        if let Some(ref image) = self.wcs_ref_image {
            params.wcs_ref_image = Some(image.clone());
        }
        if let Some(ref list) = self.ref_image_list {
            params.ref_image_list = Some(list.clone());
        }
        if let Some(count) = self.min_ref_images {
            params.min_ref_images = count;
        }
        if let Some(use_gpu) = self.use_gpu {
            params.use_gpu = use_gpu;
        }
        if let Some(ref marker) = self.marker {
            params.astrometric_marker = marker.clone();
        }
        if self.no_dedup {
            params.duplicate_reference = DuplicateReference::ProcessTwice;
        }
        params.fail_fast |= self.fail_fast;
        params.overwrite_trimmed |= self.overwrite;
        params.verbose |= verbose;

        if params.ref_image_list.is_none() {
            let local = Path::new(DEFAULT_REF_LIST_NAME);
            if local.is_file() {
                params.ref_image_list = Some(local.to_path_buf());
            }
        }

        params.validate().context("Invalid run configuration")?;
        Ok(params)
    }
}

pub fn load_config(path: &Path) -> Result<RunParameters> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("Invalid run config {}", path.display()))
}

/// Apply `key=value` engine overrides, typing each value by inference.
pub fn apply_engine_overrides(params: &mut RunParameters, overrides: &[String]) -> Result<()> {
    for entry in overrides {
        let Some((key, raw)) = entry.split_once('=') else {
            bail!("Engine override '{}' is not of the form key=value", entry);
        };
        params
            .engine
            .set(key.trim(), FlagValue::infer(raw.trim()))
            .with_context(|| format!("Cannot apply engine override '{}'", entry))?;
    }
    Ok(())
}

/// Rewrite engine tunables given after `run` as `--key=value` or
/// `--key value` into `--set key=value`.
///
/// Only names of engine tunables are rewritten; anything else is left for
/// clap, which rejects unknown flags.
pub fn lift_engine_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let keys = EngineParams::default().keys();
    let is_key = |name: &str| keys.iter().any(|k| k == name);

    let mut lifted = Vec::new();
    let mut in_run = false;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let text = match arg.to_str().map(str::to_owned) {
            Some(text) if in_run => text,
            _ => {
                in_run |= arg == "run";
                lifted.push(arg);
                continue;
            }
        };
        if text == "--" {
            in_run = false;
            lifted.push(arg);
            continue;
        }
        let Some(flag) = text.strip_prefix("--") else {
            lifted.push(arg);
            continue;
        };
        match flag.split_once('=') {
            Some((key, _)) if is_key(key) => {
                lifted.push("--set".into());
                lifted.push(flag.into());
            }
            None if is_key(flag) => match args.next() {
                Some(value) => {
                    let mut entry = OsString::from(format!("{flag}="));
                    entry.push(value);
                    lifted.push("--set".into());
                    lifted.push(entry);
                }
                None => lifted.push(arg),
            },
            _ => lifted.push(arg),
        }
    }
    lifted
}

fn parse_flag_bool(raw: &str) -> std::result::Result<bool, String> {
    match raw {
        "True" => Ok(true),
        "False" => Ok(false),
        other => Err(format!("expected True or False, got '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_bool() {
        assert_eq!(parse_flag_bool("True"), Ok(true));
        assert_eq!(parse_flag_bool("False"), Ok(false));
        assert!(parse_flag_bool("false").is_err());
        assert!(parse_flag_bool("1").is_err());
    }

    #[test]
    fn test_engine_overrides() {
        let mut params = RunParameters::default();
        apply_engine_overrides(
            &mut params,
            &["nstamps=80".to_string(), "use_stamps=False".to_string()],
        )
        .unwrap();
        assert_eq!(params.engine.nstamps, 80);
        assert!(!params.engine.use_stamps);

        assert!(apply_engine_overrides(&mut params, &["nstamps".to_string()]).is_err());
        assert!(apply_engine_overrides(&mut params, &["bogus=1".to_string()]).is_err());
    }

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_lift_engine_flags() {
        let lifted = lift_engine_flags(os_args(&[
            "diaprep", "run", "--gain=1.9", "--pdeg", "2", "--trimfrac=0.3", "--bogus=1",
        ]));
        assert_eq!(
            lifted,
            os_args(&[
                "diaprep", "run", "--set", "gain=1.9", "--set", "pdeg=2", "--trimfrac=0.3",
                "--bogus=1",
            ])
        );

        // Other subcommands are passed through untouched.
        let trim = os_args(&["diaprep", "trim", "--gain=1.9"]);
        assert_eq!(lift_engine_flags(trim.clone()), trim);
    }
}
