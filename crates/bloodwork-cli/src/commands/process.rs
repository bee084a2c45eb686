//! Process command - extract markers from a single report file.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use bloodwork_core::{ExtractionStatus, FormatId, LabReportParser};

use super::{extract_file, load_config, load_rules, render, OutputFormat};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF or UTF-8 text)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format (default: from config, else csv)
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Include MinRange/MaxRange columns
    #[arg(long)]
    include_ranges: bool,

    /// Force a format profile instead of detecting one
    #[arg(short, long)]
    profile: Option<String>,

    /// Rule catalog JSON (default: embedded catalog)
    #[arg(short, long)]
    rules: Option<PathBuf>,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let format = args
        .format
        .or_else(|| OutputFormat::from_name(&config.output.format))
        .unwrap_or(OutputFormat::Csv);
    let include_ranges = args.include_ranges || config.output.include_ranges;

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message("Loading rules...");

    let rules = load_rules(&config, args.rules.as_deref())?;
    let parser = LabReportParser::new(rules)
        .with_config(config.extraction.clone())
        .with_format_override(args.profile.map(FormatId::new));

    pb.set_message("Extracting markers...");
    let result = extract_file(&args.input, &parser, &config.input);
    pb.finish_and_clear();
    let result = result?;

    if result.status == ExtractionStatus::Empty {
        eprintln!(
            "{} No markers extracted: {}",
            style("!").yellow(),
            result.diagnostics.message.as_deref().unwrap_or("no reason given")
        );
    }

    let output = render(&result, format, include_ranges)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        print!("{}", output);
        if !output.ends_with('\n') {
            println!();
        }
    }

    debug!(
        "Extracted {} markers ({} rejected) in {:?}",
        result.records.len(),
        result.rejected_count(),
        start.elapsed()
    );

    Ok(())
}
