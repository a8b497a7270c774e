//! TAN (gnomonic) world coordinate system read from and written to FITS headers.
//!
//! Pixel coordinates in this module are 0-based array indices `(x = column,
//! y = row)`. FITS `CRPIXn` is 1-based, so `dx = x + 1 - CRPIX1`.

use crate::consts::WCS_SINGULAR_EPSILON;
use crate::error::{DiaError, Result};
use crate::io::{Card, CardValue, FitsHeader};

/// Keywords that describe the linear transform in forms other than `CDi_j`.
/// They are removed before a CD-matrix WCS is merged into a header.
const ALTERNATE_LINEAR_KEYWORDS: [&str; 9] = [
    "PC1_1", "PC1_2", "PC2_1", "PC2_2", "CDELT1", "CDELT2", "CROTA1", "CROTA2", "LONPOLE",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Wcs {
    /// Reference pixel (CRPIX1, CRPIX2), 1-based.
    pub crpix: (f64, f64),
    /// Reference sky coordinate in degrees (CRVAL1 = RA, CRVAL2 = Dec).
    pub crval: (f64, f64),
    /// Pixel offset to intermediate coordinates, degrees per pixel.
    pub cd: [[f64; 2]; 2],
    pub ctype: (String, String),
    pub equinox: Option<f64>,
    pub radesys: Option<String>,
}

impl Wcs {
    pub fn new(crpix: (f64, f64), crval: (f64, f64), cd: [[f64; 2]; 2]) -> Self {
        Self {
            crpix,
            crval,
            cd,
            ctype: ("RA---TAN".to_string(), "DEC--TAN".to_string()),
            equinox: None,
            radesys: None,
        }
    }

    /// Build a WCS from pixel scale (deg/px) and rotation (deg), with RA increasing to the left.
    pub fn from_scale_rotation(
        crpix: (f64, f64),
        crval: (f64, f64),
        scale_deg: f64,
        rotation_deg: f64,
    ) -> Self {
        let (sin_r, cos_r) = rotation_deg.to_radians().sin_cos();
        let cd = [
            [-scale_deg * cos_r, scale_deg * sin_r],
            [scale_deg * sin_r, scale_deg * cos_r],
        ];
        Self::new(crpix, crval, cd)
    }

    /// Parse CTYPE/CRPIX/CRVAL plus one of CD, PC×CDELT, or CDELT+CROTA2.
    pub fn from_header(header: &FitsHeader) -> Result<Self> {
        let ctype1 = header.get_str("CTYPE1").unwrap_or("RA---TAN").to_string();
        let ctype2 = header.get_str("CTYPE2").unwrap_or("DEC--TAN").to_string();
        for ctype in [&ctype1, &ctype2] {
            if !ctype.contains("TAN") {
                return Err(DiaError::Wcs(format!(
                    "unsupported projection '{ctype}' (only TAN)"
                )));
            }
        }

        let required = |key: &str| {
            header
                .get_f64(key)
                .ok_or_else(|| DiaError::Wcs(format!("missing {key}")))
        };
        let crpix = (required("CRPIX1")?, required("CRPIX2")?);
        let crval = (required("CRVAL1")?, required("CRVAL2")?);

        let cd = if header.contains("CD1_1") || header.contains("CD2_2") {
            let get = |key: &str| header.get_f64(key).unwrap_or(0.0);
            [
                [get("CD1_1"), get("CD1_2")],
                [get("CD2_1"), get("CD2_2")],
            ]
        } else {
            let cdelt1 = required("CDELT1")?;
            let cdelt2 = required("CDELT2")?;
            if header.contains("PC1_1") || header.contains("PC2_2") {
                let pc = |key: &str, diag: bool| {
                    header.get_f64(key).unwrap_or(if diag { 1.0 } else { 0.0 })
                };
                [
                    [cdelt1 * pc("PC1_1", true), cdelt1 * pc("PC1_2", false)],
                    [cdelt2 * pc("PC2_1", false), cdelt2 * pc("PC2_2", true)],
                ]
            } else {
                let (sin_r, cos_r) = header
                    .get_f64("CROTA2")
                    .unwrap_or(0.0)
                    .to_radians()
                    .sin_cos();
                [
                    [cdelt1 * cos_r, -cdelt2 * sin_r],
                    [cdelt1 * sin_r, cdelt2 * cos_r],
                ]
            }
        };

        let wcs = Self {
            crpix,
            crval,
            cd,
            ctype: (ctype1, ctype2),
            equinox: header.get_f64("EQUINOX"),
            radesys: header.get_str("RADESYS").map(str::to_string),
        };
        if wcs.determinant().abs() < WCS_SINGULAR_EPSILON {
            return Err(DiaError::Wcs("singular CD matrix".into()));
        }
        Ok(wcs)
    }

    pub fn determinant(&self) -> f64 {
        self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0]
    }

    /// Convert a 0-based pixel position to (RA, Dec) in degrees.
    pub fn pixel_to_sky(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x + 1.0 - self.crpix.0;
        let dy = y + 1.0 - self.crpix.1;

        let xi = (self.cd[0][0] * dx + self.cd[0][1] * dy).to_radians();
        let eta = (self.cd[1][0] * dx + self.cd[1][1] * dy).to_radians();

        let ra0 = self.crval.0.to_radians();
        let (sin_dec0, cos_dec0) = self.crval.1.to_radians().sin_cos();
        let denom = cos_dec0 - eta * sin_dec0;

        let ra = ra0 + xi.atan2(denom);
        let dec = (sin_dec0 + eta * cos_dec0).atan2((xi * xi + denom * denom).sqrt());

        (ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
    }

    /// Convert (RA, Dec) in degrees to a 0-based pixel position.
    ///
    /// Returns `None` for points on or behind the tangent plane.
    pub fn sky_to_pixel(&self, ra: f64, dec: f64) -> Option<(f64, f64)> {
        let (sin_dec, cos_dec) = dec.to_radians().sin_cos();
        let (sin_dec0, cos_dec0) = self.crval.1.to_radians().sin_cos();
        let (sin_dra, cos_dra) = (ra - self.crval.0).to_radians().sin_cos();

        let d = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_dra;
        if d <= 1e-12 {
            return None;
        }

        let xi = (cos_dec * sin_dra / d).to_degrees();
        let eta = ((sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_dra) / d).to_degrees();

        let det = self.determinant();
        if det.abs() < WCS_SINGULAR_EPSILON {
            return None;
        }
        let dx = (self.cd[1][1] * xi - self.cd[0][1] * eta) / det;
        let dy = (-self.cd[1][0] * xi + self.cd[0][0] * eta) / det;

        Some((self.crpix.0 + dx - 1.0, self.crpix.1 + dy - 1.0))
    }

    /// WCS of a sub-image whose top-left corner is at 0-based pixel (x0, y0).
    pub fn cropped(&self, x0: usize, y0: usize) -> Self {
        let mut wcs = self.clone();
        wcs.crpix = (self.crpix.0 - x0 as f64, self.crpix.1 - y0 as f64);
        wcs
    }

    /// Header cards describing this WCS in CD-matrix form.
    pub fn to_cards(&self) -> Vec<Card> {
        let mut cards = vec![
            Card::new("CTYPE1", CardValue::Str(self.ctype.0.clone())),
            Card::new("CTYPE2", CardValue::Str(self.ctype.1.clone())),
            Card::new("CRPIX1", CardValue::Float(self.crpix.0)),
            Card::new("CRPIX2", CardValue::Float(self.crpix.1)),
            Card::new("CRVAL1", CardValue::Float(self.crval.0)),
            Card::new("CRVAL2", CardValue::Float(self.crval.1)),
            Card::new("CUNIT1", CardValue::Str("deg".into())),
            Card::new("CUNIT2", CardValue::Str("deg".into())),
            Card::new("CD1_1", CardValue::Float(self.cd[0][0])),
            Card::new("CD1_2", CardValue::Float(self.cd[0][1])),
            Card::new("CD2_1", CardValue::Float(self.cd[1][0])),
            Card::new("CD2_2", CardValue::Float(self.cd[1][1])),
        ];
        if let Some(equinox) = self.equinox {
            cards.push(Card::new("EQUINOX", CardValue::Float(equinox)));
        }
        if let Some(ref radesys) = self.radesys {
            cards.push(Card::new("RADESYS", CardValue::Str(radesys.clone())));
        }
        cards
    }

    /// Replace any WCS description in `header` with this one.
    pub fn apply_to(&self, header: &mut FitsHeader) {
        header.remove_where(|k| ALTERNATE_LINEAR_KEYWORDS.contains(&k));
        header.merge(&self.to_cards());
    }

    /// Mean pixel scale in arcseconds per pixel.
    pub fn pixel_scale_arcsec(&self) -> f64 {
        let scale_x = (self.cd[0][0].powi(2) + self.cd[1][0].powi(2)).sqrt();
        let scale_y = (self.cd[0][1].powi(2) + self.cd[1][1].powi(2)).sqrt();
        (scale_x + scale_y) / 2.0 * 3600.0
    }

    /// Position angle of the Y axis, degrees east of north.
    pub fn rotation_degrees(&self) -> f64 {
        self.cd[1][0].atan2(self.cd[1][1]).to_degrees()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn sample() -> Wcs {
        Wcs::from_scale_rotation((50.5, 50.5), (150.0, 2.0), 1.0 / 3600.0, 30.0)
    }

    #[test]
    fn test_reference_pixel_maps_to_crval() {
        let wcs = sample();
        let (ra, dec) = wcs.pixel_to_sky(49.5, 49.5);
        assert_relative_eq!(ra, 150.0, epsilon = 1e-10);
        assert_relative_eq!(dec, 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_sky_pixel_inverse() {
        let wcs = sample();
        for &(x, y) in &[(0.0, 0.0), (99.0, 0.0), (12.3, 87.6), (99.0, 99.0)] {
            let (ra, dec) = wcs.pixel_to_sky(x, y);
            let (bx, by) = wcs.sky_to_pixel(ra, dec).unwrap();
            assert_relative_eq!(bx, x, epsilon = 1e-6);
            assert_relative_eq!(by, y, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_cdelt_crota_form_matches_cd_form() {
        let mut h = FitsHeader::new();
        h.set("CRPIX1", CardValue::Float(10.0));
        h.set("CRPIX2", CardValue::Float(20.0));
        h.set("CRVAL1", CardValue::Float(30.0));
        h.set("CRVAL2", CardValue::Float(-5.0));
        h.set("CDELT1", CardValue::Float(-1e-4));
        h.set("CDELT2", CardValue::Float(1e-4));
        h.set("CROTA2", CardValue::Float(0.0));
        let wcs = Wcs::from_header(&h).unwrap();
        assert_relative_eq!(wcs.cd[0][0], -1e-4);
        assert_relative_eq!(wcs.cd[1][1], 1e-4);
        assert_eq!(wcs.cd[0][1], 0.0);

        let mut merged = h.clone();
        wcs.apply_to(&mut merged);
        assert!(!merged.contains("CDELT1"));
        assert_eq!(Wcs::from_header(&merged).unwrap(), wcs);
    }

    #[test]
    fn test_missing_crval_is_error() {
        let mut h = FitsHeader::new();
        h.set("CRPIX1", CardValue::Float(1.0));
        h.set("CRPIX2", CardValue::Float(1.0));
        assert!(Wcs::from_header(&h).is_err());
    }

    #[test]
    fn test_cropped_shifts_reference_pixel() {
        let wcs = sample();
        let crop = wcs.cropped(20, 10);
        let (ra, dec) = wcs.pixel_to_sky(25.0, 15.0);
        let (ra_c, dec_c) = crop.pixel_to_sky(5.0, 5.0);
        assert_relative_eq!(ra, ra_c, epsilon = 1e-12);
        assert_relative_eq!(dec, dec_c, epsilon = 1e-12);
    }
}
