use anyhow::{Context, Result};
use clap::Args;
use diaprep_core::select::select_references;
use diaprep_core::trim::{spin_and_trim, BilinearReprojector};

use super::params::ParamArgs;
use crate::progress::BarReporter;

#[derive(Args)]
pub struct TrimArgs {
    #[command(flatten)]
    pub params: ParamArgs,
}

pub fn run(args: &TrimArgs, verbose: bool) -> Result<()> {
    let params = args.params.to_params(verbose)?;
    let selection = select_references(&params).context("Reference selection failed")?;

    println!(
        "Registering {} image(s) onto {}",
        selection.images.len(),
        selection.wcs_reference.display()
    );

    let reporter = BarReporter::new();
    let trimmed = spin_and_trim(
        &selection.images,
        &selection.wcs_reference,
        &params.trim_config(),
        &BilinearReprojector,
        &reporter,
    )
    .context("Registration failed")?;

    for path in trimmed.iter() {
        println!("  {}", path.display());
    }
    if let Some(reference) = trimmed.reference() {
        println!("Trimmed WCS reference: {}", reference.display());
    }
    Ok(())
}
