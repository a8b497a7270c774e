use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};

use fitsio::errors::check_status;
use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::FitsFile;
use ndarray::Array2;

use crate::error::{DiaError, Result};

use super::header::{Card, CardValue, FitsHeader};

/// Buffer length for one keyword, value or comment field (FLEN_CARD).
const FIELD_LEN: usize = 81;

/// A FITS primary image: path, header and pixels.
///
/// Pixel data has shape (NAXIS2, NAXIS1) with BSCALE/BZERO applied.
#[derive(Clone, Debug)]
pub struct FitsImage {
    pub path: PathBuf,
    pub header: FitsHeader,
    pub data: Array2<f32>,
}

impl FitsImage {
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }
}

pub(crate) fn fits_error(path: &Path, err: fitsio::errors::Error) -> DiaError {
    DiaError::InvalidFits(format!("{}: {err}", path.display()))
}

/// Open `path` read-only and position on the primary HDU.
pub(crate) fn open_primary(path: &Path) -> Result<(FitsFile, FitsHdu)> {
    let mut fptr = FitsFile::open(path).map_err(|e| fits_error(path, e))?;
    let hdu = fptr.primary_hdu().map_err(|e| fits_error(path, e))?;
    Ok((fptr, hdu))
}

/// Image shape as (height, width). Accepts NAXIS = 2, or 3 with NAXIS3 = 1.
pub(crate) fn image_shape(path: &Path, hdu: &FitsHdu) -> Result<(usize, usize)> {
    match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => match shape.as_slice() {
            [h, w] | [1, h, w] if *h > 0 && *w > 0 => Ok((*h, *w)),
            other => Err(DiaError::InvalidFits(format!(
                "{}: expected a 2-D image, got shape {other:?}",
                path.display()
            ))),
        },
        _ => Err(DiaError::InvalidFits(format!(
            "{}: primary HDU is not an image",
            path.display()
        ))),
    }
}

fn field_text(buf: &[c_char; FIELD_LEN]) -> String {
    unsafe { CStr::from_ptr(buf.as_ptr()) }
        .to_string_lossy()
        .trim()
        .to_string()
}

/// Keyword name, raw value text and comment of the `n`th card (1-based).
fn read_record(fptr: &mut FitsFile, n: c_int) -> fitsio::errors::Result<(String, String, String)> {
    let mut name = [0 as c_char; FIELD_LEN];
    let mut value = [0 as c_char; FIELD_LEN];
    let mut comment = [0 as c_char; FIELD_LEN];
    let mut status = 0;
    unsafe {
        fitsio::sys::ffgkyn(
            fptr.as_raw(),
            n,
            name.as_mut_ptr(),
            value.as_mut_ptr(),
            comment.as_mut_ptr(),
            &mut status,
        );
    }
    check_status(status)?;
    Ok((field_text(&name), field_text(&value), field_text(&comment)))
}

/// cfitsio's classification of a raw value: C, L, I, F or X.
fn value_class(raw: &str) -> Option<u8> {
    let raw = CString::new(raw).ok()?;
    let mut dtype: c_char = 0;
    let mut status = 0;
    unsafe {
        fitsio::sys::ffdtyp(raw.as_ptr() as *mut c_char, &mut dtype, &mut status);
    }
    (status == 0).then_some(dtype as u8)
}

fn typed_value(fptr: &mut FitsFile, hdu: &FitsHdu, keyword: &str, raw: &str) -> CardValue {
    let fallback = || CardValue::Str(raw.trim_matches('\'').trim_end().to_string());
    match value_class(raw) {
        Some(b'L') => CardValue::Logical(raw == "T"),
        Some(b'I') => hdu
            .read_key::<i64>(fptr, keyword)
            .map(CardValue::Int)
            .unwrap_or_else(|_| fallback()),
        Some(b'F') => hdu
            .read_key::<f64>(fptr, keyword)
            .map(CardValue::Float)
            .unwrap_or_else(|_| fallback()),
        Some(b'C') => hdu
            .read_key::<String>(fptr, keyword)
            .map(CardValue::Str)
            .unwrap_or_else(|_| fallback()),
        _ => fallback(),
    }
}

/// Every card of the current HDU in file order, END excluded.
pub(crate) fn read_header(path: &Path, fptr: &mut FitsFile, hdu: &FitsHdu) -> Result<FitsHeader> {
    let mut count: c_int = 0;
    let mut more: c_int = 0;
    let mut status = 0;
    unsafe {
        fitsio::sys::ffghsp(fptr.as_raw(), &mut count, &mut more, &mut status);
    }
    check_status(status).map_err(|e| fits_error(path, e))?;

    let mut cards = Vec::with_capacity(count.max(0) as usize);
    for n in 1..=count {
        let (keyword, raw, comment) = read_record(fptr, n).map_err(|e| fits_error(path, e))?;
        let commentary = raw.is_empty() || matches!(keyword.as_str(), "COMMENT" | "HISTORY" | "");
        let card = if commentary {
            Card {
                keyword,
                value: CardValue::Commentary(comment),
                comment: None,
            }
        } else {
            Card {
                value: typed_value(fptr, hdu, &keyword, &raw),
                keyword,
                comment: Some(comment).filter(|c| !c.is_empty()),
            }
        };
        cards.push(card);
    }
    Ok(FitsHeader::from_cards(cards))
}

/// Read the header and pixels of a FITS image.
pub fn read_fits(path: &Path) -> Result<FitsImage> {
    let (mut fptr, hdu) = open_primary(path)?;
    let (h, w) = image_shape(path, &hdu)?;
    let header = read_header(path, &mut fptr, &hdu)?;
    let pixels: Vec<f32> = hdu
        .read_image(&mut fptr)
        .map_err(|e| fits_error(path, e))?;

    let data = Array2::from_shape_vec((h, w), pixels).map_err(|e| {
        DiaError::InvalidFits(format!("{}: pixel buffer shape: {e}", path.display()))
    })?;
    Ok(FitsImage {
        path: path.to_path_buf(),
        header,
        data,
    })
}

/// Read only the primary header of a FITS file.
pub fn read_fits_header(path: &Path) -> Result<FitsHeader> {
    let (mut fptr, hdu) = open_primary(path)?;
    read_header(path, &mut fptr, &hdu)
}
