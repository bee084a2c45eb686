//! Formats command - list the catalog's format profiles.

use std::path::PathBuf;

use clap::Args;
use console::style;

use super::{load_config, load_rules};

/// Arguments for the formats command.
#[derive(Args)]
pub struct FormatsArgs {
    /// Rule catalog JSON (default: embedded catalog)
    #[arg(short, long)]
    rules: Option<PathBuf>,
}

pub async fn run(args: FormatsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let rules = load_rules(&config, args.rules.as_deref())?;

    println!(
        "{} {} format profiles, {} markers",
        style("ℹ").blue(),
        rules.profiles().len(),
        rules.markers().len()
    );
    println!();

    for profile in rules.profiles() {
        let strategies: Vec<String> = profile.strategies().iter().map(|s| s.to_string()).collect();
        println!("{}", style(profile.id()).bold());
        if !profile.profile().description.is_empty() {
            println!("  {}", profile.profile().description);
        }
        println!("  strategies:  {}", strategies.join(", "));
        if profile.specificity() == 0 {
            println!("  signals:     {}", style("none (override only)").yellow());
        } else {
            println!("  specificity: {}", profile.specificity());
        }
    }

    Ok(())
}
