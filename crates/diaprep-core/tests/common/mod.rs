#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use approx::assert_relative_eq;
use ndarray::Array2;

use diaprep_core::engine::{DiffEngine, EngineRequest, EngineVariant};
use diaprep_core::error::{DiaError, Result};
use diaprep_core::io::{read_fits, write_fits, CardValue, FitsHeader};
use diaprep_core::select::list_matching;
use diaprep_core::wcs::Wcs;

/// One arcsecond in degrees.
pub const ARCSEC: f64 = 1.0 / 3600.0;

/// Keywords stripped from mock difference images so propagation has work to do.
pub const WCS_KEYWORDS: [&str; 14] = [
    "CTYPE1", "CTYPE2", "CRPIX1", "CRPIX2", "CRVAL1", "CRVAL2", "CUNIT1", "CUNIT2", "CD1_1",
    "CD1_2", "CD2_1", "CD2_2", "EQUINOX", "RADESYS",
];

/// TAN WCS with 1"/px centred on the image.
pub fn centered_wcs(width: usize, height: usize, ra: f64, dec: f64, rotation_deg: f64) -> Wcs {
    let crpix = (width as f64 / 2.0 + 0.5, height as f64 / 2.0 + 0.5);
    Wcs::from_scale_rotation(crpix, (ra, dec), ARCSEC, rotation_deg)
}

/// Compare two WCS up to the precision float keywords are stored with.
pub fn assert_wcs_close(actual: &Wcs, expected: &Wcs) {
    assert_eq!(actual.ctype, expected.ctype);
    assert_eq!(actual.radesys, expected.radesys);
    assert_eq!(actual.equinox.is_some(), expected.equinox.is_some());
    let pairs = [
        (actual.crpix.0, expected.crpix.0),
        (actual.crpix.1, expected.crpix.1),
        (actual.crval.0, expected.crval.0),
        (actual.crval.1, expected.crval.1),
    ];
    for (a, e) in pairs {
        assert_relative_eq!(a, e, max_relative = 1e-12);
    }
    for r in 0..2 {
        for c in 0..2 {
            assert_relative_eq!(actual.cd[r][c], expected.cd[r][c], epsilon = 1e-18, max_relative = 1e-12);
        }
    }
}

/// Flat sky with Gaussian stars at the given (x, y) positions.
pub fn star_field(width: usize, height: usize, stars: &[(f64, f64)]) -> Array2<f32> {
    let sigma2 = 2.0 * 1.5f64 * 1.5;
    Array2::from_shape_fn((height, width), |(r, c)| {
        let mut v = 100.0;
        for &(sx, sy) in stars {
            let d2 = (c as f64 - sx).powi(2) + (r as f64 - sy).powi(2);
            v += 1000.0 * (-d2 / sigma2).exp();
        }
        v as f32
    })
}

/// Write a FITS image carrying `wcs` and an OBJECT card.
pub fn write_image(path: &Path, data: &Array2<f32>, wcs: &Wcs) {
    let mut header = FitsHeader::new();
    header.set("OBJECT", CardValue::Str("TEST FIELD".into()));
    header.set("EXPTIME", CardValue::Float(30.0));
    wcs.apply_to(&mut header);
    write_fits(path, &header, data).unwrap();
}

/// Write `names` as 100x100 star fields with slightly different pointings.
pub fn write_field(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    fs::create_dir_all(dir).unwrap();
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let path = dir.join(name);
            let offset = i as f64 * 2.0;
            let wcs = centered_wcs(100, 100, 150.0 + offset * ARCSEC, 2.0 - offset * ARCSEC, i as f64);
            let data = star_field(100, 100, &[(40.0 + offset, 55.0 - offset), (62.0, 38.0)]);
            write_image(&path, &data, &wcs);
            path
        })
        .collect()
}

/// Index of the brightest pixel as (x, y).
pub fn peak(data: &Array2<f32>) -> (usize, usize) {
    let mut best = (0, 0);
    let mut best_val = f32::MIN;
    for ((r, c), &v) in data.indexed_iter() {
        if v > best_val {
            best_val = v;
            best = (c, r);
        }
    }
    best
}

/// Engine stand-in: writes `d_<name>` for every readable matching input, without WCS.
#[derive(Default)]
pub struct MockEngine {
    pub requests: Mutex<Vec<EngineRequest>>,
}

impl MockEngine {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<EngineRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl DiffEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn variant(&self) -> EngineVariant {
        EngineVariant::Cpu
    }

    fn subtract(&self, request: &EngineRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        for image in list_matching(&request.loc_data, &request.name_pattern)? {
            let Ok(source) = read_fits(&image) else {
                continue;
            };
            let mut header = source.header.clone();
            header.remove_where(|k| WCS_KEYWORDS.contains(&k));
            let name = image.file_name().unwrap().to_string_lossy().into_owned();
            let diff = source.data.mapv(|v| v - 100.0);
            write_fits(&request.loc_output.join(format!("d_{name}")), &header, &diff)?;
        }
        Ok(())
    }
}

/// Engine that leaves one difference image behind and then fails.
#[derive(Default)]
pub struct FailingEngine {
    pub calls: Mutex<usize>,
}

impl DiffEngine for FailingEngine {
    fn name(&self) -> &str {
        "failing"
    }

    fn variant(&self) -> EngineVariant {
        EngineVariant::Gpu
    }

    fn subtract(&self, request: &EngineRequest) -> Result<()> {
        *self.calls.lock().unwrap() += 1;
        let header = FitsHeader::new();
        write_fits(
            &request.loc_output.join("d_partial.fits"),
            &header,
            &Array2::zeros((4, 4)),
        )?;
        Err(DiaError::Engine {
            variant: self.variant().to_string(),
            reason: "exited with exit status: 1".into(),
        })
    }
}

pub fn read_log(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}
