use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use log::debug;

use nodenet::config::Config;
use nodenet::constants;
use nodenet::logger::{init_logger, level_for, set_log_level};
use nodenet::run;

#[derive(Parser)]
#[command(name = "nodenet")]
#[command(about = "Bare-metal node network configuration", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render ifupdown configuration for this host from network data
    Render(RenderArgs),

    /// Build network data from a port inventory and attachment list
    Synthesize(SynthesizeArgs),
}

#[derive(Args)]
struct RenderArgs {
    /// Path to network_data.json
    #[arg(long)]
    network_data: PathBuf,

    /// Configuration file
    #[arg(long, default_value = constants::FILE_CONFIG)]
    config: PathBuf,

    /// Print the files instead of writing them
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Args)]
struct SynthesizeArgs {
    /// Path to the inventory document
    #[arg(long)]
    inventory: PathBuf,

    /// Write network data here instead of standard output
    #[arg(long)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn render(args: RenderArgs) -> Result<()> {
    let mut config = Config::load(&args.config)?;
    config.debug |= args.debug;
    config.dry_run |= args.dry_run;
    set_log_level(level_for(config.debug));
    debug!("Using configuration {:?}", config);
    run::render(&config, &args.network_data)
}

fn synthesize(args: SynthesizeArgs) -> Result<()> {
    set_log_level(level_for(args.debug));
    run::synthesize_inventory(&args.inventory, args.output.as_deref())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = init_logger(level_for(false))
        .map_err(|e| anyhow!("unable to initialize logger: {}", e))
        .and_then(|_| match cli.command {
            Command::Render(args) => render(args),
            Command::Synthesize(args) => synthesize(args),
        });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Use eprintln! here in case logger does not initialize.
            eprintln!("nodenet: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
