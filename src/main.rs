// Command-line entry point: API server and one-shot macrostep runs
use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use std::io::stderr;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

mod cmd;

use cmd::inspect::NodesArgs;
use cmd::macrostep::{PowerArgs, RebootArgs};
use cmd::serve::ServeArgs;

#[derive(Parser, Debug)]
#[command(author, version, about = "Bare-metal fleet reboot and power orchestration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "fleetboot.yaml")]
    config: PathBuf,

    /// Verbose output - shows more detailed logs
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Reboot nodes through one of the reboot macrosteps
    Reboot(RebootArgs),
    /// Power nodes on or off, or read their power status
    Power(PowerArgs),
    /// Show the recorded state of nodes
    Nodes(NodesArgs),
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let default_directives = format!(
        "fleetboot={level},fleetboot_common={level},fleetboot_macrostep={level},fleetboot_server={level},fleetboot_bmc={level},fleetboot_ipxe={level},fleetboot_probe={level},tower=warn,hyper=warn",
        level = default_level
    );
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    registry()
        .with(filter)
        .with(fmt::layer().with_writer(stderr))
        .init();
    debug!(config = %cli.config.display(), "Logger initialized");

    match cli.command {
        Commands::Serve(args) => cmd::serve::run(&cli.config, args).await,
        Commands::Reboot(args) => cmd::macrostep::reboot(&cli.config, args).await,
        Commands::Power(args) => cmd::macrostep::power(&cli.config, args).await,
        Commands::Nodes(args) => cmd::inspect::nodes(&cli.config, args).await,
        Commands::CheckConfig => cmd::inspect::check_config(&cli.config).await,
    }
}
