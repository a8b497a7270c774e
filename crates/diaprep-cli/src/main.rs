mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "diaprep", about = "Difference-imaging preprocessing driver")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show FITS dimensions, BITPIX and WCS
    Info(commands::info::InfoArgs),
    /// List input images and the chosen reference images
    Select(commands::select::SelectArgs),
    /// Register every input onto the WCS reference and trim
    Trim(commands::trim::TrimArgs),
    /// Run registration, subtraction and WCS propagation
    Run(commands::pipeline::RunArgs),
    /// Print or save the default run configuration as TOML
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse_from(commands::params::lift_engine_flags(std::env::args_os()));

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Select(args) => commands::select::run(args, cli.verbose),
        Commands::Trim(args) => commands::trim::run(args, cli.verbose),
        Commands::Run(args) => commands::pipeline::run(args, cli.verbose),
        Commands::Config(args) => commands::config::run(args),
    }
}
