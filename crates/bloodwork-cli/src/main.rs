//! `bloodwork` command line: biomarker tables from lab report PDFs and text.

mod commands;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{batch, config, detect, formats, process};

/// Turn lab reports into marker/value tables
#[derive(Parser)]
#[command(name = "bloodwork", author, version, about, long_about = None)]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract markers from one report
    Process(process::ProcessArgs),

    /// Extract markers from every report a glob matches
    Batch(batch::BatchArgs),

    /// Show the format profile a report is classified as, and why
    Detect(detect::DetectArgs),

    /// List the catalog's format profiles in detection order
    Formats(formats::FormatsArgs),

    /// Show, create or export configuration
    Config(config::ConfigArgs),
}

impl Commands {
    async fn run(self, config_path: Option<&str>) -> anyhow::Result<()> {
        match self {
            Self::Process(args) => process::run(args, config_path).await,
            Self::Batch(args) => batch::run(args, config_path).await,
            Self::Detect(args) => detect::run(args, config_path).await,
            Self::Formats(args) => formats::run(args, config_path).await,
            Self::Config(args) => config::run(args, config_path).await,
        }
    }
}

/// Logs go to stderr so rendered tables on stdout stay clean.
fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose > 2)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set up logging: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    cli.command.run(cli.config.as_deref()).await
}
