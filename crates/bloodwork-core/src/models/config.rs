//! Configuration structures for the extraction engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::BloodworkError;

/// Main configuration for bloodwork.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BloodworkConfig {
    /// Extraction thresholds and toggles.
    pub extraction: ExtractionConfig,

    /// Document reader configuration.
    pub input: InputConfig,

    /// Output defaults.
    pub output: OutputConfig,

    /// Rule catalog location.
    pub rules: RulesConfig,
}

/// Extraction engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Shortest marker label accepted from any strategy.
    pub min_marker_length: usize,

    /// Longest label (in words) the fragmented strategy treats as a marker.
    pub max_label_words: usize,

    /// How many lines below a label the fragmented strategy searches for a value.
    pub value_lookahead_lines: usize,

    /// Fragmented fallback runs only when cheaper strategies produce fewer
    /// candidates than this. Format profiles may override it.
    pub fallback_min_candidates: usize,

    /// Keep candidates whose label matches no catalog marker.
    pub accept_unlisted_markers: bool,

    /// Plausible value window applied to unlisted markers.
    pub unlisted_value_range: (Decimal, Decimal),

    /// Rejoin lines broken mid-token by the document reader.
    pub rejoin_broken_lines: bool,

    /// Drop long lines that repeat on every page.
    pub strip_repeated_lines: bool,

    /// Occurrences before a line counts as repeated boilerplate.
    pub repeated_line_min_count: usize,

    /// Shorter lines are never treated as boilerplate.
    pub repeated_line_min_length: usize,

    /// Inputs with a higher share of control characters are unreadable.
    pub max_control_char_ratio: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_marker_length: 2,
            max_label_words: 8,
            value_lookahead_lines: 3,
            fallback_min_candidates: 3,
            accept_unlisted_markers: false,
            unlisted_value_range: (Decimal::new(1, 3), Decimal::from(10_000)),
            rejoin_broken_lines: true,
            strip_repeated_lines: true,
            repeated_line_min_count: 3,
            repeated_line_min_length: 20,
            max_control_char_ratio: 0.10,
        }
    }
}

/// Document reader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Minimum non-whitespace characters before the fallback reader is tried.
    pub min_text_length: usize,

    /// Allow the fallback reader at all.
    pub enable_fallback_reader: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            min_text_length: 50,
            enable_fallback_reader: true,
        }
    }
}

/// Output defaults used by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Include MinRange/MaxRange columns in tabular output.
    pub include_ranges: bool,

    /// Default output format name (csv, json or text).
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            include_ranges: false,
            format: "csv".to_string(),
        }
    }
}

/// Rule catalog location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Catalog JSON file. The embedded catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
}

impl BloodworkConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, BloodworkError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| BloodworkError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), BloodworkError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| BloodworkError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
