use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use diaprep_core::pipeline::Pipeline;
use tracing::debug;

use super::params::{apply_engine_overrides, ParamArgs};
use crate::progress::BarReporter;
use crate::summary::{print_run_report, print_run_summary};

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub params: ParamArgs,

    /// Engine tunable as key=value (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,
}

pub fn run(args: &RunArgs, verbose: bool) -> Result<()> {
    let mut params = args.params.to_params(verbose)?;
    apply_engine_overrides(&mut params, &args.set)?;
    debug!(?params, "Run parameters");

    print_run_summary(&params);

    let pipeline = Pipeline::new(params).with_reporter(Arc::new(BarReporter::new()));
    let report = pipeline.run().context("Pipeline failed before processing started")?;

    print_run_report(&report);
    if !report.is_success() {
        bail!(
            "Run ended in state {} with {} error(s)",
            report.state,
            report.errors.len()
        );
    }
    println!(
        "Difference images written to {}",
        pipeline.params().loc_output.display()
    );
    Ok(())
}
