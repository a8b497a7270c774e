use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use diaprep_core::io::read_fits_header;
use diaprep_core::wcs::Wcs;

#[derive(Args)]
pub struct InfoArgs {
    /// Input FITS file
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let header = read_fits_header(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    println!("File:        {}", args.file.display());
    match header.image_dims() {
        Some((width, height)) => println!("Dimensions:  {}x{}", width, height),
        None => println!("Dimensions:  not a 2-D image"),
    }
    if let Some(bitpix) = header.get_i64("BITPIX") {
        println!("BITPIX:      {}", bitpix);
    }
    if let Some(object) = header.get_str("OBJECT") {
        println!("Object:      {}", object);
    }

    match Wcs::from_header(&header) {
        Ok(wcs) => {
            println!("WCS:         {} / {}", wcs.ctype.0, wcs.ctype.1);
            println!("  CRVAL:     {:.6}, {:.6}", wcs.crval.0, wcs.crval.1);
            println!("  CRPIX:     {:.2}, {:.2}", wcs.crpix.0, wcs.crpix.1);
            println!("  Scale:     {:.4} arcsec/px", wcs.pixel_scale_arcsec());
            println!("  Rotation:  {:.3} deg", wcs.rotation_degrees());
        }
        Err(e) => println!("WCS:         none ({})", e),
    }

    Ok(())
}
