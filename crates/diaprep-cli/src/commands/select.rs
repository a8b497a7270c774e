use anyhow::{Context, Result};
use clap::Args;
use diaprep_core::select::select_references;

use super::params::ParamArgs;

#[derive(Args)]
pub struct SelectArgs {
    #[command(flatten)]
    pub params: ParamArgs,
}

pub fn run(args: &SelectArgs, verbose: bool) -> Result<()> {
    let params = args.params.to_params(verbose)?;
    let selection = select_references(&params).context("Reference selection failed")?;

    println!("Input images ({}):", selection.images.len());
    for image in &selection.images {
        let mark = if *image == selection.wcs_reference { "*" } else { " " };
        println!("  {} {}", mark, image.display());
    }

    let how = if selection.wcs_reference_explicit {
        "configured"
    } else {
        "auto"
    };
    println!("WCS reference:  {} ({})", selection.wcs_reference.display(), how);

    match selection.photometric {
        Some(ref set) => {
            println!("Photometric:    {}", set.primary.display());
            println!("REF images:     {}", set.images.len());
        }
        None => println!("Photometric:    none (no REF directory)"),
    }
    match selection.ref_image_list {
        Some(ref list) => println!("Reference list: {}", list.display()),
        None => println!("Reference list: none"),
    }

    Ok(())
}
