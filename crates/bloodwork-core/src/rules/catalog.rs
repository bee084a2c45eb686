//! Serde schema of a rule catalog file.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::FormatId;
use crate::models::{AbnormalFlag, StrategyKind};

/// Complete rule catalog as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCatalog {
    /// Marker definitions.
    pub markers: Vec<MarkerDefinition>,

    /// Format profiles in priority order (first declared wins ties).
    pub formats: Vec<FormatProfile>,

    /// Noise filters.
    #[serde(default)]
    pub exclusions: ExclusionSpec,

    /// Date patterns and scoring keywords.
    #[serde(default)]
    pub dates: DateSpec,
}

/// A marker the engine knows how to validate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerDefinition {
    /// Canonical name used for output and deduplication.
    pub name: String,

    /// Alternative spellings, matched case- and punctuation-insensitively.
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Regular expressions tried after all literal aliases.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Grouping tag (lipids, cbc, metabolic, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Value type.
    #[serde(default)]
    pub kind: MarkerKind,

    /// Allowed values for categorical markers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,

    /// Lowest plausible value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Decimal>,

    /// Highest plausible value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Decimal>,

    /// Unit hint used when the report prints none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// What to do with values outside [min, max].
    #[serde(default)]
    pub out_of_range: OutOfRangePolicy,
}

impl MarkerDefinition {
    /// Whether `value` lies within the plausible range. Missing bounds are open.
    pub fn in_range(&self, value: Decimal) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// Value type of a marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    #[default]
    Numeric,
    Categorical,
}

/// Handling of implausible numeric values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRangePolicy {
    /// Drop the candidate and count it as rejected.
    #[default]
    Reject,
    /// Keep the record and mark it out of band.
    Flag,
}

/// Layout description of one laboratory vendor's reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatProfile {
    /// Profile id.
    pub id: FormatId,

    /// Human readable description.
    #[serde(default)]
    pub description: String,

    /// Signals the classifier evaluates.
    #[serde(default)]
    pub signals: SignalSet,

    /// Strategies in the order they run.
    pub strategies: Vec<StrategyKind>,

    /// Regex templates per strategy.
    #[serde(default)]
    pub templates: Templates,

    /// Overrides the engine-wide fragmented fallback threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_threshold: Option<usize>,

    /// Status words printed in front of fragmented values (`In Range 14.3`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_prefixes: Vec<StatusPrefix>,
}

/// A status word that may lead a value line, and the flag it implies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPrefix {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<AbnormalFlag>,
}

/// Classifier signals of a format profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalSet {
    /// Every one of these substrings must appear (case-insensitive).
    #[serde(default)]
    pub required: Vec<String>,

    /// At least one of these substrings must appear (case-insensitive).
    #[serde(default)]
    pub any_of: Vec<String>,

    /// None of these substrings may appear (case-insensitive).
    #[serde(default)]
    pub forbidden: Vec<String>,

    /// Every one of these regular expressions must match.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Structural cue: minimum number of non-empty lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_lines: Option<usize>,

    /// Structural cue: share of lines made of one alphabetic word.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_single_word_ratio: Option<f64>,
}

impl SignalSet {
    /// Number of positive signals; higher is more specific.
    pub fn specificity(&self) -> usize {
        self.required.len()
            + self.patterns.len()
            + usize::from(!self.any_of.is_empty())
            + usize::from(self.min_lines.is_some())
            + usize::from(self.min_single_word_ratio.is_some())
    }
}

/// Regex templates of a profile.
///
/// Templates use named groups: `marker` and `value` are required, `low`,
/// `high`, `range`, `unit` and `flag` are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Templates {
    #[serde(default)]
    pub labeled_pair: Vec<String>,

    #[serde(default)]
    pub table_row: Vec<String>,
}

impl Templates {
    pub fn for_strategy(&self, strategy: StrategyKind) -> &[String] {
        match strategy {
            StrategyKind::LabeledPair => &self.labeled_pair,
            StrategyKind::TableRow => &self.table_row,
            StrategyKind::FragmentedAdjacency => &[],
        }
    }
}

/// Noise filters applied while normalizing and matching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExclusionSpec {
    /// Lines containing any of these (case-insensitive) never yield candidates.
    #[serde(default)]
    pub line_keywords: Vec<String>,

    /// Labels containing any of these whole words are not markers.
    #[serde(default)]
    pub label_words: Vec<String>,

    /// Lines matching these regular expressions are removed during normalization.
    #[serde(default)]
    pub noise_patterns: Vec<String>,

    /// Lines consisting only of a unit are never labels.
    #[serde(default)]
    pub unit_tokens: Vec<String>,
}

/// Date patterns and the keywords that score them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateSpec {
    /// Patterns tried against the normalized text.
    #[serde(default)]
    pub patterns: Vec<DatePattern>,

    /// Report-header keywords that mark the test date.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Keywords that disqualify a date on the same line.
    #[serde(default)]
    pub ignore_keywords: Vec<String>,

    /// Maximum characters between a keyword and the date on one line.
    #[serde(default = "default_keyword_window")]
    pub keyword_window: usize,
}

fn default_keyword_window() -> usize {
    40
}

impl Default for DateSpec {
    fn default() -> Self {
        Self {
            patterns: vec![
                DatePattern::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b", DateOrder::Mdy),
                DatePattern::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b", DateOrder::Ymd),
                DatePattern::new(
                    r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+(\d{1,2}),?\s+(\d{4})\b",
                    DateOrder::MonthNameMdy,
                ),
            ],
            keywords: vec![
                "collected".to_string(),
                "collection date".to_string(),
                "reported".to_string(),
                "received".to_string(),
                "date of service".to_string(),
            ],
            ignore_keywords: vec!["dob".to_string(), "date of birth".to_string(), "birth".to_string()],
            keyword_window: default_keyword_window(),
        }
    }
}

/// One date pattern with the order of its three capture groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatePattern {
    pub regex: String,
    pub order: DateOrder,
}

impl DatePattern {
    pub fn new(regex: impl Into<String>, order: DateOrder) -> Self {
        Self {
            regex: regex.into(),
            order,
        }
    }
}

/// Meaning of the three capture groups of a date pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    /// month, day, year
    Mdy,
    /// day, month, year
    Dmy,
    /// year, month, day
    Ymd,
    /// day, month name, year
    MonthNameDmy,
    /// month name, day, year
    MonthNameMdy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_marker_in_range_with_open_bounds() {
        let marker: MarkerDefinition =
            serde_json::from_str(r#"{"name": "LDL-P", "max": 1000}"#).unwrap();

        assert!(marker.in_range(Decimal::from(0)));
        assert!(marker.in_range(Decimal::from(1000)));
        assert!(!marker.in_range(Decimal::from_str("1000.1").unwrap()));
        assert_eq!(marker.kind, MarkerKind::Numeric);
        assert_eq!(marker.out_of_range, OutOfRangePolicy::Reject);
    }

    #[test]
    fn test_signal_specificity() {
        let signals: SignalSet = serde_json::from_str(
            r#"{"required": ["cleveland heartlab"], "any_of": ["omegacheck", "fatty acids"], "patterns": ["% by wt"]}"#,
        )
        .unwrap();
        assert_eq!(signals.specificity(), 3);
    }

    #[test]
    fn test_profile_strategy_names() {
        let profile: FormatProfile = serde_json::from_str(
            r#"{"id": "x", "strategies": ["labeled_pair", "fragmented_adjacency"]}"#,
        )
        .unwrap();
        assert_eq!(
            profile.strategies,
            vec![StrategyKind::LabeledPair, StrategyKind::FragmentedAdjacency]
        );
        assert!(profile.templates.for_strategy(StrategyKind::TableRow).is_empty());
    }
}
