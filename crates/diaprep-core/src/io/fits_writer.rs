use std::ffi::CString;
use std::fs;
use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};

use fitsio::errors::check_status;
use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use ndarray::Array2;

use crate::error::Result;

use super::fits::{fits_error, read_header};
use super::header::{Card, CardValue, FitsHeader};

/// Significant digits for float keywords (negative selects %G formatting).
const FLOAT_DECIMALS: c_int = -15;

/// Keywords cfitsio derives from the pixel array.
fn is_structural(keyword: &str) -> bool {
    matches!(
        keyword,
        "SIMPLE" | "BITPIX" | "NAXIS" | "EXTEND" | "BSCALE" | "BZERO" | "END"
    ) || keyword
        .strip_prefix("NAXIS")
        .is_some_and(|axis| axis.chars().all(|c| c.is_ascii_digit()))
}

fn c_text(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

/// Write or replace one card in the current HDU.
fn write_card(fptr: &mut FitsFile, card: &Card) -> fitsio::errors::Result<()> {
    let keyword = c_text(&card.keyword);
    let comment = c_text(card.comment.as_deref().unwrap_or(""));
    let (key, comm) = (keyword.as_ptr() as *mut c_char, comment.as_ptr() as *mut c_char);
    let mut status = 0;
    unsafe {
        let raw = fptr.as_raw();
        match &card.value {
            CardValue::Str(s) => {
                let value = c_text(s);
                fitsio::sys::ffukys(raw, key, value.as_ptr() as *mut c_char, comm, &mut status);
            }
            CardValue::Logical(b) => {
                fitsio::sys::ffukyl(raw, key, c_int::from(*b), comm, &mut status);
            }
            CardValue::Int(i) => {
                fitsio::sys::ffukyj(raw, key, *i, comm, &mut status);
            }
            CardValue::Float(f) => {
                fitsio::sys::ffukyd(raw, key, *f, FLOAT_DECIMALS, comm, &mut status);
            }
            CardValue::Commentary(text) => {
                let text = c_text(text);
                let text = text.as_ptr() as *mut c_char;
                if card.keyword == "HISTORY" {
                    fitsio::sys::ffphis(raw, text, &mut status);
                } else {
                    fitsio::sys::ffpcom(raw, text, &mut status);
                }
            }
        }
    }
    check_status(status)
}

fn delete_key(fptr: &mut FitsFile, keyword: &str) -> fitsio::errors::Result<()> {
    let keyword = c_text(keyword);
    let mut status = 0;
    unsafe {
        fitsio::sys::ffdkey(fptr.as_raw(), keyword.as_ptr() as *mut c_char, &mut status);
    }
    check_status(status)
}

/// Sibling path a file is staged under before it is renamed into place.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `data` as a BITPIX -32 primary image. Non-structural cards of `header`
/// are carried over in order.
///
/// The file is written next to `path` and renamed over it, so `path` never
/// holds a partial image.
pub fn write_fits(path: &Path, header: &FitsHeader, data: &Array2<f32>) -> Result<()> {
    let tmp = temp_sibling(path);
    if let Err(e) = write_new(&tmp, header, data) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_new(path: &Path, header: &FitsHeader, data: &Array2<f32>) -> Result<()> {
    let (h, w) = data.dim();
    let description = ImageDescription {
        data_type: ImageType::Float,
        dimensions: &[h, w],
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()
        .map_err(|e| fits_error(path, e))?;
    let hdu = fptr.primary_hdu().map_err(|e| fits_error(path, e))?;

    let pixels: Vec<f32> = data.iter().copied().collect();
    hdu.write_image(&mut fptr, &pixels)
        .map_err(|e| fits_error(path, e))?;

    // cfitsio writes its own COMMENT cards on create; do not repeat them.
    let created = read_header(path, &mut fptr, &hdu)?;
    for card in header.cards().iter().filter(|c| {
        if c.is_commentary() {
            !created.cards().contains(c)
        } else {
            !is_structural(&c.keyword)
        }
    }) {
        write_card(&mut fptr, card).map_err(|e| fits_error(path, e))?;
    }
    Ok(())
}

/// Edit the keyword cards of an existing FITS file. Pixel data is not touched.
///
/// Keywords the edit removes are deleted, changed or added keywords are
/// updated in place. Commentary cards added by the edit are not written.
pub fn update_header_in_place<F>(path: &Path, edit: F) -> Result<FitsHeader>
where
    F: FnOnce(&mut FitsHeader) -> Result<()>,
{
    let mut fptr = FitsFile::edit(path).map_err(|e| fits_error(path, e))?;
    let hdu = fptr.primary_hdu().map_err(|e| fits_error(path, e))?;
    let before = read_header(path, &mut fptr, &hdu)?;

    let mut after = before.clone();
    edit(&mut after)?;

    let editable = |c: &&Card| !c.is_commentary() && !is_structural(&c.keyword);
    for card in before.cards().iter().filter(editable) {
        if !after.contains(&card.keyword) {
            delete_key(&mut fptr, &card.keyword).map_err(|e| fits_error(path, e))?;
        }
    }
    for card in after.cards().iter().filter(editable) {
        if before.get(&card.keyword) != Some(&card.value) {
            write_card(&mut fptr, card).map_err(|e| fits_error(path, e))?;
        }
    }
    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_keywords() {
        assert!(is_structural("NAXIS2"));
        assert!(is_structural("EXTEND"));
        assert!(!is_structural("NAXISX"));
        assert!(!is_structural("CRVAL1"));
    }

    #[test]
    fn test_temp_sibling_stays_in_directory() {
        let tmp = temp_sibling(Path::new("out/a_trim.fits"));
        assert_eq!(tmp, Path::new("out/a_trim.fits.tmp"));
    }
}
