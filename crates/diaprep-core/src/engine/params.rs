use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{DiaError, Result};

/// Untyped engine tunable as given on a command line, typed by inference.
#[derive(Clone, Debug, PartialEq)]
pub enum FlagValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    None,
}

impl FlagValue {
    /// Integer when there is no decimal point, then `True`/`False`, float,
    /// `None`, and finally a plain string.
    pub fn infer(raw: &str) -> Self {
        let raw = raw.trim();
        if !raw.contains('.') {
            if let Ok(i) = raw.parse::<i64>() {
                return Self::Int(i);
            }
        }
        match raw {
            "True" => return Self::Bool(true),
            "False" => return Self::Bool(false),
            "None" => return Self::None,
            _ => {}
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Self::Float(f);
        }
        Self::Str(raw.to_string())
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Self::Bool(b) => Value::Bool(*b),
            Self::Str(s) => Value::String(s.clone()),
            Self::None => Value::Null,
        }
    }
}

impl FromStr for FlagValue {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::infer(s))
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{}", format_float(*v)),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Str(s) => write!(f, "{s}"),
            Self::None => write!(f, "None"),
        }
    }
}

/// Whole floats keep one decimal so the engine parses them as floats.
fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// Tunables of the external subtraction engine. Opaque to the pipeline and
/// forwarded verbatim as `--key=value` flags.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    pub bdeg: u32,
    pub ccd_group_size: u32,
    pub cluster_mask_radius: u32,
    pub datekey: Option<String>,
    pub detect_threshold: f64,
    pub diff_std_threshold: f64,
    pub do_photometry: bool,
    pub fft_kernel_threshold: f64,
    pub fwhm_mult: f64,
    pub fwhm_section: Option<String>,
    pub gain: f64,
    pub image_list_file: String,
    pub iterations: u32,
    pub kernel_maximum_radius: f64,
    pub kernel_minimum_radius: f64,
    pub make_difference_images: bool,
    pub mask_cluster: bool,
    pub n_parallel: u32,
    pub nstamps: u32,
    pub pdeg: u32,
    pub pixel_max: f64,
    pub pixel_min: f64,
    pub pixel_rejection_threshold: f64,
    pub preconvolve_images: bool,
    #[serde(rename = "preconvolve_FWHM")]
    pub preconvolve_fwhm: f64,
    pub psf_fit_radius: f64,
    pub psf_profile_type: String,
    pub readnoise: f64,
    pub ref_exclude_file: Option<String>,
    pub ref_include_file: Option<String>,
    pub reference_max_roundness: f64,
    pub reference_min_seeing: f64,
    pub reference_seeing_factor: f64,
    pub reference_sky_factor: f64,
    pub registration_image: Option<String>,
    pub sdeg: u32,
    pub sky_degree: u32,
    pub sky_subtract_mode: String,
    pub sky_subtract_percent: f64,
    pub stamp_edge_distance: u32,
    pub stamp_half_width: u32,
    pub star_detect_sigma: f64,
    pub star_file: Option<String>,
    pub star_file_has_magnitudes: bool,
    pub star_file_is_one_based: bool,
    pub star_file_number_match: u32,
    pub star_file_transform_degree: u32,
    pub star_reference_image: Option<String>,
    pub subtract_sky: bool,
    pub use_fft_kernel_pixels: bool,
    pub use_stamps: bool,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            bdeg: 0,
            ccd_group_size: 100,
            cluster_mask_radius: 50,
            datekey: Some("MJD-OBS".into()),
            detect_threshold: 4.0,
            diff_std_threshold: 10.0,
            do_photometry: false,
            fft_kernel_threshold: 3.0,
            fwhm_mult: 6.5,
            fwhm_section: None,
            gain: 1.0,
            image_list_file: "images".into(),
            iterations: 1,
            kernel_maximum_radius: 20.0,
            kernel_minimum_radius: 5.0,
            make_difference_images: true,
            mask_cluster: false,
            n_parallel: 1,
            nstamps: 50,
            pdeg: 0,
            pixel_max: 50000.0,
            pixel_min: 0.0,
            pixel_rejection_threshold: 3.0,
            preconvolve_images: false,
            preconvolve_fwhm: 1.5,
            psf_fit_radius: 5.0,
            psf_profile_type: "gaussian".into(),
            readnoise: 1.0,
            ref_exclude_file: None,
            ref_include_file: None,
            reference_max_roundness: 1.3,
            reference_min_seeing: 1.0,
            reference_seeing_factor: 1.01,
            reference_sky_factor: 1.3,
            registration_image: None,
            sdeg: 0,
            sky_degree: 0,
            sky_subtract_mode: "percent".into(),
            sky_subtract_percent: 0.01,
            stamp_edge_distance: 40,
            stamp_half_width: 20,
            star_detect_sigma: 12.0,
            star_file: None,
            star_file_has_magnitudes: false,
            star_file_is_one_based: true,
            star_file_number_match: 10000,
            star_file_transform_degree: 2,
            star_reference_image: None,
            subtract_sky: true,
            use_fft_kernel_pixels: false,
            use_stamps: true,
        }
    }
}

impl EngineParams {
    fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(DiaError::Configuration(
                "engine parameters did not serialize to a map".into(),
            )),
            Err(e) => Err(DiaError::Configuration(format!(
                "engine parameters: {e}"
            ))),
        }
    }

    /// Names of every tunable, in flag spelling.
    pub fn keys(&self) -> Vec<String> {
        self.to_map()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Set one tunable by its flag name. Unknown names and values that do not
    /// fit the field's type are rejected.
    pub fn set(&mut self, key: &str, value: FlagValue) -> Result<()> {
        let mut map = self.to_map()?;
        let current = map.get(key).ok_or_else(|| {
            DiaError::Configuration(format!("unknown engine parameter '{key}'"))
        })?;

        let candidates = match (current, &value) {
            (_, FlagValue::None) => vec![Value::Null],
            (Value::String(_), v) => vec![Value::String(v.to_string())],
            (Value::Number(n), FlagValue::Int(i)) if n.is_f64() => {
                vec![Number::from_f64(*i as f64).map(Value::Number).unwrap_or(Value::Null)]
            }
            (Value::Null, FlagValue::Str(_)) => vec![value.to_json()],
            (Value::Null, v) => vec![v.to_json(), Value::String(v.to_string())],
            (_, v) => vec![v.to_json()],
        };

        let mut last_err = None;
        for candidate in candidates {
            map.insert(key.to_string(), candidate);
            match serde_json::from_value::<EngineParams>(Value::Object(map.clone())) {
                Ok(updated) => {
                    *self = updated;
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(DiaError::Configuration(format!(
            "invalid value '{value}' for engine parameter '{key}'{}",
            last_err.map(|e| format!(": {e}")).unwrap_or_default()
        )))
    }

    /// `--key=value` flags for every tunable that has a value.
    pub fn to_flags(&self) -> Result<Vec<String>> {
        Ok(self
            .to_map()?
            .into_iter()
            .filter_map(|(key, value)| {
                let rendered = match value {
                    Value::Null => return None,
                    Value::Bool(true) => "True".to_string(),
                    Value::Bool(false) => "False".to_string(),
                    Value::Number(n) if n.is_f64() => {
                        format_float(n.as_f64().unwrap_or_default())
                    }
                    Value::Number(n) => n.to_string(),
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Some(format!("--{key}={rendered}"))
            })
            .collect())
    }
}
