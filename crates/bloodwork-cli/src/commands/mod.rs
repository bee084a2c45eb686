//! Subcommands and the helpers they share.

pub mod batch;
pub mod config;
pub mod detect;
pub mod formats;
pub mod process;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use bloodwork_core::models::{BloodworkConfig, ExtractionResult, InputConfig};
use bloodwork_core::pdf::{DocumentReader, PdfReader};
use bloodwork_core::{LabReportParser, ReportParser, RuleStore};

/// Output format for extraction results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Marker table, one row per marker
    Csv,
    /// Structured JSON document
    Json,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    /// Parse the format name stored in the config file.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "text" | "txt" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Text => "txt",
        }
    }
}

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bloodwork")
        .join("config.json")
}

/// Load the configuration from an explicit path, the default location, or
/// fall back to defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<BloodworkConfig> {
    if let Some(path) = config_path {
        return Ok(BloodworkConfig::from_file(Path::new(path))?);
    }

    let default_path = default_config_path();
    if default_path.exists() {
        debug!("Using config file {}", default_path.display());
        Ok(BloodworkConfig::from_file(&default_path)?)
    } else {
        Ok(BloodworkConfig::default())
    }
}

/// Build the rule store from `--rules`, the configured catalog, or the
/// embedded catalog, in that order.
pub fn load_rules(config: &BloodworkConfig, rules_path: Option<&Path>) -> anyhow::Result<Arc<RuleStore>> {
    let path = rules_path.or(config.rules.catalog_path.as_deref());
    let store = match path {
        Some(path) => {
            debug!("Loading rule catalog from {}", path.display());
            RuleStore::from_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to load rules from {}: {}", path.display(), e))?
        }
        None => RuleStore::embedded()?,
    };
    Ok(Arc::new(store))
}

/// Read and extract one report file (`.txt` or `.pdf`).
pub fn extract_file(path: &Path, parser: &LabReportParser, input: &InputConfig) -> anyhow::Result<ExtractionResult> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let data = fs::read(path)?;
    let result = match extension.as_str() {
        "pdf" => {
            let text = PdfReader::from_config(input).read_text(&data)?;
            parser.parse(&text)?
        }
        "txt" | "text" => parser.parse_bytes(&data)?,
        _ => anyhow::bail!("Unsupported file format: {}", extension),
    };
    Ok(result)
}

/// Read the text of a report file without extracting.
pub fn read_text(path: &Path, input: &InputConfig) -> anyhow::Result<String> {
    let data = fs::read(path)?;
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        Ok(PdfReader::from_config(input).read_text(&data)?)
    } else {
        Ok(String::from_utf8(data)?)
    }
}

/// Whether a path has an extension the CLI can read.
pub fn is_supported(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    matches!(ext.to_lowercase().as_str(), "pdf" | "txt" | "text")
}

/// Render a result in the requested format.
pub fn render(result: &ExtractionResult, format: OutputFormat, include_ranges: bool) -> anyhow::Result<String> {
    match format {
        OutputFormat::Csv => format_csv(result, include_ranges),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&result.to_structured())?),
        OutputFormat::Text => Ok(format_text(result, include_ranges)),
    }
}

fn format_csv(result: &ExtractionResult, include_ranges: bool) -> anyhow::Result<String> {
    let table = result.to_table(include_ranges);
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(&table.header)?;
    for row in &table.rows {
        wtr.write_record(row)?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(result: &ExtractionResult, include_ranges: bool) -> String {
    let mut output = String::new();

    output.push_str(&format!("Format: {}\n", result.format));
    output.push_str(&format!("Test date: {}\n", result.test_date));
    output.push('\n');

    for record in &result.records {
        output.push_str(&format!("  {}: {}", record.marker, record.value));
        if let Some(unit) = &record.unit {
            output.push_str(&format!(" {}", unit));
        }
        if include_ranges && (record.min_range.is_some() || record.max_range.is_some()) {
            let low = record.min_range.map(|d| d.to_string()).unwrap_or_default();
            let high = record.max_range.map(|d| d.to_string()).unwrap_or_default();
            output.push_str(&format!(" [{} - {}]", low, high));
        }
        if let Some(flag) = record.flag {
            output.push_str(&format!(" ({:?})", flag));
        }
        output.push('\n');
    }

    let diagnostics = &result.diagnostics;
    output.push('\n');
    output.push_str(&format!(
        "Candidates: {}, rejected: {}, unresolved: {}, duplicates: {}\n",
        diagnostics.candidates, diagnostics.rejected, diagnostics.unresolved, diagnostics.duplicates
    ));
    if let Some(message) = &diagnostics.message {
        output.push_str(&format!("Note: {}\n", message));
    }

    output
}
