//! The extraction pipeline: normalization, classification, matching,
//! validation and date inference.

pub mod classifier;
pub mod dates;
pub mod matcher;
pub mod normalize;
pub mod parser;
pub mod patterns;
pub mod strategies;
pub mod validator;

pub use classifier::{Classification, FormatClassifier, TextShape};
pub use dates::{DateCandidate, DateExtractor};
pub use matcher::{MatchOutcome, PatternMatcher};
pub use normalize::{control_char_ratio, NormalizedText, TextNormalizer};
pub use parser::{LabReportParser, ReportParser};
pub use strategies::{FragmentedStrategy, MatchContext, Strategy, TemplateStrategy};
pub use validator::ValueValidator;

use crate::error::ExtractionError;
use crate::models::StrategyKind;
use crate::rules::FormatId;

/// Result type for whole-document extraction.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Unvalidated marker/value match, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Marker label as printed.
    pub label: String,
    /// Value text as printed.
    pub raw_value: String,
    /// Lower range bound from its own column.
    pub raw_low: Option<String>,
    /// Upper range bound from its own column.
    pub raw_high: Option<String>,
    /// Range text still to be split (`70-100`, `<200`).
    pub raw_range: Option<String>,
    pub unit: Option<String>,
    pub flag: Option<String>,
    /// Byte offset of the match in the normalized text.
    pub offset: usize,
    pub strategy: StrategyKind,
    pub format: FormatId,
}

impl Candidate {
    pub fn new(
        label: impl Into<String>,
        raw_value: impl Into<String>,
        offset: usize,
        strategy: StrategyKind,
        format: FormatId,
    ) -> Self {
        Self {
            label: label.into(),
            raw_value: raw_value.into(),
            raw_low: None,
            raw_high: None,
            raw_range: None,
            unit: None,
            flag: None,
            offset,
            strategy,
            format,
        }
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.raw_range = Some(range.into());
        self
    }

    pub fn with_bounds(mut self, low: Option<String>, high: Option<String>) -> Self {
        self.raw_low = low;
        self.raw_high = high;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flag = Some(flag.into());
        self
    }
}
