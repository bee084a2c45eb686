//! Detect command - classify a report without extracting.

use std::path::PathBuf;

use clap::Args;
use console::style;

use bloodwork_core::LabReportParser;

use super::{load_config, load_rules, read_text};

/// Arguments for the detect command.
#[derive(Args)]
pub struct DetectArgs {
    /// Input file (PDF or UTF-8 text)
    #[arg(required = true)]
    input: PathBuf,

    /// Rule catalog JSON (default: embedded catalog)
    #[arg(short, long)]
    rules: Option<PathBuf>,
}

pub async fn run(args: DetectArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let rules = load_rules(&config, args.rules.as_deref())?;
    let parser = LabReportParser::new(rules).with_config(config.extraction.clone());
    let text = read_text(&args.input, &config.input)?;
    let classification = parser.classify(&text);

    if classification.is_unknown() {
        println!("Format: {}", style(&classification.format).yellow());
        println!("No format profile matched.");
        return Ok(());
    }

    println!("Format: {}", style(&classification.format).green());
    println!("Specificity: {}", classification.specificity);
    println!("Signals:");
    for signal in &classification.signals {
        println!("  - {}", signal);
    }

    if classification.matched.len() > 1 {
        let others: Vec<&str> = classification
            .matched
            .iter()
            .filter(|id| **id != classification.format)
            .map(|id| id.as_str())
            .collect();
        println!("Also matched: {}", others.join(", "));
    }

    Ok(())
}
