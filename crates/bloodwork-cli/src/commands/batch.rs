//! Batch processing command for multiple report files.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use bloodwork_core::models::InputConfig;
use bloodwork_core::{ExtractionResult, ExtractionStatus, FormatId, LabReportParser};

use super::{extract_file, is_supported, load_config, load_rules, render, OutputFormat};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern of input files
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file (default: from config, else csv)
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

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers (default: available CPUs)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

/// Result of processing a single file.
struct FileOutcome {
    path: PathBuf,
    result: Option<ExtractionResult>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| is_supported(p))
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let format = args
        .format
        .or_else(|| OutputFormat::from_name(&config.output.format))
        .unwrap_or(OutputFormat::Csv);
    let include_ranges = args.include_ranges || config.output.include_ranges;
    let jobs = args
        .jobs
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
        .max(1);
    debug!("Processing with {} workers", jobs);

    let rules = load_rules(&config, args.rules.as_deref())?;
    let parser = Arc::new(
        LabReportParser::new(rules)
            .with_config(config.extraction.clone())
            .with_format_override(args.profile.clone().map(FormatId::new)),
    );
    let input_config = Arc::new(config.input.clone());

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    // CPU-bound extraction runs on the blocking pool, at most `jobs` at a time
    let semaphore = Arc::new(Semaphore::new(jobs));
    let mut handles = Vec::with_capacity(files.len());
    for path in files {
        let semaphore = Arc::clone(&semaphore);
        let parser = Arc::clone(&parser);
        let input_config = Arc::clone(&input_config);
        let pb = overall_pb.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            let outcome = tokio::task::spawn_blocking(move || process_single_file(path, &parser, &input_config)).await?;
            pb.inc(1);
            anyhow::Ok(outcome)
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = handle.await??;
        if let Some(error_msg) = &outcome.error {
            if args.continue_on_error {
                warn!("Failed to process {}: {}", outcome.path.display(), error_msg);
            } else {
                overall_pb.abandon();
                error!("Failed to process {}: {}", outcome.path.display(), error_msg);
                anyhow::bail!("Processing failed for {}: {}", outcome.path.display(), error_msg);
            }
        }
        outcomes.push(outcome);
    }

    overall_pb.finish_and_clear();

    if let Some(output_dir) = &args.output_dir {
        let written: Vec<&FileOutcome> = outcomes.iter().filter(|o| o.result.is_some()).collect();
        let paths: Vec<&Path> = written.iter().map(|o| o.path.as_path()).collect();
        let names = output_names(&paths, format.extension());

        for (outcome, output_name) in written.into_iter().zip(names) {
            let Some(result) = &outcome.result else { continue };
            let output_path = output_dir.join(output_name);

            fs::write(&output_path, render(result, format, include_ranges)?)?;
            debug!("Wrote output to {}", output_path.display());
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &outcomes)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let extracted = outcomes
        .iter()
        .filter(|o| o.result.as_ref().is_some_and(|r| r.status == ExtractionStatus::Success))
        .count();
    let empty = outcomes
        .iter()
        .filter(|o| o.result.as_ref().is_some_and(|r| r.status == ExtractionStatus::Empty))
        .count();
    let failed: Vec<_> = outcomes.iter().filter(|o| o.error.is_some()).collect();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        outcomes.len(),
        start.elapsed()
    );
    println!(
        "   {} extracted, {} empty, {} failed",
        style(extracted).green(),
        style(empty).yellow(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for outcome in &failed {
            println!(
                "  - {}: {}",
                outcome.path.display(),
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

/// Output file name per input: the stem, or the whole file name when two
/// inputs share a stem, with a counter when even those collide.
fn output_names(paths: &[&Path], extension: &str) -> Vec<String> {
    let stem = |p: &Path| p.file_stem().and_then(|s| s.to_str()).unwrap_or("report").to_string();
    let file_name = |p: &Path| p.file_name().and_then(|s| s.to_str()).unwrap_or("report").to_string();

    let mut stem_counts: HashMap<String, usize> = HashMap::new();
    for &path in paths {
        *stem_counts.entry(stem(path)).or_default() += 1;
    }

    let mut taken = HashSet::new();
    paths
        .iter()
        .map(|&path| {
            let base = if stem_counts[&stem(path)] > 1 { file_name(path) } else { stem(path) };
            let mut name = format!("{}.{}", base, extension);
            let mut n = 2;
            while !taken.insert(name.clone()) {
                name = format!("{}-{}.{}", base, n, extension);
                n += 1;
            }
            name
        })
        .collect()
}

fn process_single_file(path: PathBuf, parser: &LabReportParser, input: &InputConfig) -> FileOutcome {
    let file_start = Instant::now();
    let result = extract_file(&path, parser, input);
    let processing_time_ms = file_start.elapsed().as_millis() as u64;

    match result {
        Ok(result) => FileOutcome {
            path,
            result: Some(result),
            error: None,
            processing_time_ms,
        },
        Err(e) => FileOutcome {
            path,
            result: None,
            error: Some(e.to_string()),
            processing_time_ms,
        },
    }
}

fn write_summary(path: &Path, outcomes: &[FileOutcome]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "format",
        "test_date",
        "records",
        "rejected",
        "processing_time_ms",
        "error",
    ])?;

    for outcome in outcomes {
        let filename = outcome
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        if let Some(result) = &outcome.result {
            let status = match result.status {
                ExtractionStatus::Success => "success",
                ExtractionStatus::Empty => "empty",
            };
            wtr.write_record([
                filename,
                status,
                result.format.as_str(),
                &result.test_date.to_string(),
                &result.records.len().to_string(),
                &result.rejected_count().to_string(),
                &outcome.processing_time_ms.to_string(),
                result.diagnostics.message.as_deref().unwrap_or(""),
            ])?;
        } else {
            wtr.write_record([
                filename,
                "error",
                "",
                "",
                "",
                "",
                &outcome.processing_time_ms.to_string(),
                outcome.error.as_deref().unwrap_or(""),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_names_keep_stems_when_unique() {
        let paths = [Path::new("in/a.txt"), Path::new("in/b.pdf")];
        assert_eq!(output_names(&paths, "csv"), vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn test_output_names_disambiguate_shared_stems() {
        let paths = [
            Path::new("in/a.pdf"),
            Path::new("in/a.txt"),
            Path::new("x/b.txt"),
            Path::new("y/b.txt"),
        ];
        assert_eq!(
            output_names(&paths, "json"),
            vec!["a.pdf.json", "a.txt.json", "b.txt.json", "b.txt-2.json"]
        );
    }
}
