//! Extraction result data model and its tabular/structured output forms.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

use crate::rules::FormatId;

/// Comparison prefix carried by a reported value (`<5.0`, `>=60`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Qualifier {
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

impl Qualifier {
    /// Parse a comparison prefix, including the typographic forms.
    pub fn from_prefix(s: &str) -> Option<Self> {
        match s.trim() {
            "<" => Some(Self::LessThan),
            "<=" | "=<" | "≤" => Some(Self::LessOrEqual),
            ">" => Some(Self::GreaterThan),
            ">=" | "=>" | "≥" => Some(Self::GreaterOrEqual),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterOrEqual => ">=",
        }
    }
}

/// Abnormal-result flag printed next to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbnormalFlag {
    High,
    Low,
    Abnormal,
    Critical,
}

impl AbnormalFlag {
    pub fn from_token(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "h" | "high" | "hi" => Some(Self::High),
            "l" | "low" | "lo" => Some(Self::Low),
            "a" | "abnormal" | "abn" | "*" => Some(Self::Abnormal),
            "c" | "critical" | "crit" | "hh" | "ll" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Token that `from_token` maps back to this flag.
    pub fn token(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
            Self::Abnormal => "abnormal",
            Self::Critical => "critical",
        }
    }
}

/// A validated marker value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkerValue {
    /// Numeric result, with the comparison qualifier it was reported with.
    Numeric {
        value: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qualifier: Option<Qualifier>,
    },
    /// Categorical result in its canonical spelling.
    Text(String),
}

impl MarkerValue {
    pub fn numeric(value: Decimal) -> Self {
        Self::Numeric {
            value,
            qualifier: None,
        }
    }

    /// Numeric part of the value, if any.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Numeric { value, .. } => Some(*value),
            Self::Text(_) => None,
        }
    }

    pub fn qualifier(&self) -> Option<Qualifier> {
        match self {
            Self::Numeric { qualifier, .. } => *qualifier,
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric { value, qualifier } => {
                if let Some(q) = qualifier {
                    f.write_str(q.symbol())?;
                }
                write!(f, "{}", value)
            }
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// One validated marker reading. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Canonical marker name.
    pub marker: String,

    /// Validated value.
    pub value: MarkerValue,

    /// Lower bound of the reported reference range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_range: Option<Decimal>,

    /// Upper bound of the reported reference range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_range: Option<Decimal>,

    /// Unit as printed, or the catalog's unit hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Abnormal flag printed with the value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<AbnormalFlag>,

    /// Set when the value lies outside the marker's plausible range and the
    /// marker is configured to flag rather than reject.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub out_of_band: bool,
}

/// Inferred test date of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestDate {
    Known(NaiveDate),
    #[default]
    Unknown,
}

impl TestDate {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for TestDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Unknown => f.write_str(Self::UNKNOWN),
        }
    }
}

impl Serialize for TestDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TestDate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == Self::UNKNOWN {
            return Ok(Self::Unknown);
        }
        NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Self::Known)
            .map_err(serde::de::Error::custom)
    }
}

/// Terminal state of a successful extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// At least one record was produced.
    Success,
    /// Nothing usable was found; see the diagnostics message.
    Empty,
}

/// Extraction strategy identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// `Marker: value` / `Marker ..... value` pairs on one line.
    LabeledPair,
    /// Marker, value and range bounds as columns on one line.
    TableRow,
    /// Label and value split across adjacent lines.
    FragmentedAdjacency,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LabeledPair => "labeled_pair",
            Self::TableRow => "table_row",
            Self::FragmentedAdjacency => "fragmented_adjacency",
        })
    }
}

/// Why a candidate was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// Label matched no catalog marker.
    Unresolved { label: String },
    /// Value text could not be parsed.
    Unparseable { marker: String, raw: String },
    /// Numeric value outside the marker's plausible range.
    OutOfRange { marker: String, value: Decimal },
    /// Categorical value not among the allowed values.
    NotAllowed { marker: String, raw: String },
    /// Numeric text given for a categorical marker or vice versa.
    WrongKind { marker: String, raw: String },
}

impl Rejection {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved { .. })
    }
}

/// Per-document diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Candidates produced by the pattern matcher.
    pub candidates: usize,
    /// Candidates whose value failed validation.
    pub rejected: usize,
    /// Candidates whose label resolved to no marker.
    pub unresolved: usize,
    /// Valid candidates discarded because an earlier one had the same marker.
    pub duplicates: usize,
    /// Strategies that actually ran, in order.
    pub strategies_run: Vec<StrategyKind>,
    /// Whether the fragmented fallback ran.
    pub fallback_used: bool,
    /// Individual rejections in source order.
    pub rejections: Vec<Rejection>,
    /// Explanation attached to empty results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of extracting one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Records in source order, unique by canonical marker name.
    pub records: Vec<ExtractedRecord>,
    /// Inferred test date.
    pub test_date: TestDate,
    /// Detected (or forced) format profile.
    pub format: FormatId,
    /// Terminal state.
    pub status: ExtractionStatus,
    /// Diagnostics counts.
    pub diagnostics: Diagnostics,
}

impl ExtractionResult {
    /// An empty result explaining why nothing was extracted.
    pub fn empty(format: FormatId, test_date: TestDate, diagnostics: Diagnostics, message: impl Into<String>) -> Self {
        let mut diagnostics = diagnostics;
        diagnostics.message = Some(message.into());
        Self {
            records: Vec::new(),
            test_date,
            format,
            status: ExtractionStatus::Empty,
            diagnostics,
        }
    }

    /// Candidates dropped by validation, unresolved labels included.
    pub fn rejected_count(&self) -> usize {
        self.diagnostics.rejected + self.diagnostics.unresolved
    }

    pub fn record(&self, marker: &str) -> Option<&ExtractedRecord> {
        self.records.iter().find(|r| r.marker == marker)
    }

    /// Tabular form: `Marker Name, [MinRange, MaxRange,] <test date>`.
    pub fn to_table(&self, include_ranges: bool) -> Table {
        let mut header = vec!["Marker Name".to_string()];
        if include_ranges {
            header.push("MinRange".to_string());
            header.push("MaxRange".to_string());
        }
        header.push(self.test_date.to_string());

        let rows = self
            .records
            .iter()
            .map(|record| {
                let mut row = vec![record.marker.clone()];
                if include_ranges {
                    row.push(record.min_range.map(|d| d.to_string()).unwrap_or_default());
                    row.push(record.max_range.map(|d| d.to_string()).unwrap_or_default());
                }
                row.push(record.value.to_string());
                row
            })
            .collect();

        Table { header, rows }
    }

    /// Structured form: `{results: [...], test_date}`.
    pub fn to_structured(&self) -> StructuredReport {
        StructuredReport {
            results: self
                .records
                .iter()
                .map(|record| StructuredRow {
                    marker: record.marker.clone(),
                    value: record.value.to_string(),
                    min_range: record.min_range,
                    max_range: record.max_range,
                    unit: record.unit.clone(),
                    flag: record.flag,
                })
                .collect(),
            test_date: self.test_date,
        }
    }
}

/// Header plus rows, ready for a CSV writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Structured output document.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredReport {
    pub results: Vec<StructuredRow>,
    pub test_date: TestDate,
}

/// One row of the structured output.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredRow {
    pub marker: String,
    pub value: String,
    pub min_range: Option<Decimal>,
    pub max_range: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<AbnormalFlag>,
}
