//! Candidate validation: marker resolution, value parsing, plausibility.

use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::trace;

use super::patterns::{NUMERIC_VALUE, ONE_SIDED_RANGE, TRAILING_FLAG, TWO_SIDED_RANGE};
use super::Candidate;
use crate::models::{AbnormalFlag, ExtractedRecord, ExtractionConfig, MarkerValue, Qualifier, Rejection};
use crate::rules::{normalize_key, MarkerDefinition, MarkerKind, OutOfRangePolicy, RuleStore};

/// Turns candidates into records, or explains why not.
pub struct ValueValidator<'a> {
    rules: &'a RuleStore,
    config: &'a ExtractionConfig,
}

impl<'a> ValueValidator<'a> {
    pub fn new(rules: &'a RuleStore, config: &'a ExtractionConfig) -> Self {
        Self { rules, config }
    }

    pub fn validate(&self, candidate: &Candidate) -> Result<ExtractedRecord, Rejection> {
        let (raw_value, embedded_flag) = split_flag(&candidate.raw_value);
        let flag = candidate
            .flag
            .as_deref()
            .and_then(AbnormalFlag::from_token)
            .or(embedded_flag);

        let (min_range, max_range) = self.reference_range(candidate);

        let record = match self.rules.resolve(&candidate.label) {
            Some((marker, how)) => {
                trace!(label = %candidate.label, marker = %marker.name, resolution = ?how, "resolved");
                let (value, out_of_band) = match marker.kind {
                    MarkerKind::Numeric => self.numeric(marker, raw_value)?,
                    MarkerKind::Categorical => (categorical(marker, raw_value)?, false),
                };
                ExtractedRecord {
                    marker: marker.name.clone(),
                    value,
                    min_range,
                    max_range,
                    unit: candidate.unit.clone().or_else(|| marker.unit.clone()),
                    flag,
                    out_of_band,
                }
            }
            None if self.config.accept_unlisted_markers => {
                let name = display_name(&candidate.label);
                if name.is_empty() {
                    return Err(Rejection::Unresolved {
                        label: candidate.label.clone(),
                    });
                }
                let value = self.unlisted(&name, raw_value)?;
                ExtractedRecord {
                    marker: name,
                    value,
                    min_range,
                    max_range,
                    unit: candidate.unit.clone(),
                    flag,
                    out_of_band: false,
                }
            }
            None => {
                return Err(Rejection::Unresolved {
                    label: candidate.label.clone(),
                });
            }
        };

        Ok(record)
    }

    fn numeric(&self, marker: &MarkerDefinition, raw: &str) -> Result<(MarkerValue, bool), Rejection> {
        let Some((value, qualifier)) = parse_numeric(raw) else {
            return Err(if looks_textual(raw) {
                Rejection::WrongKind {
                    marker: marker.name.clone(),
                    raw: raw.to_string(),
                }
            } else {
                Rejection::Unparseable {
                    marker: marker.name.clone(),
                    raw: raw.to_string(),
                }
            });
        };

        let in_range = marker.in_range(value);
        if !in_range && marker.out_of_range == OutOfRangePolicy::Reject {
            return Err(Rejection::OutOfRange {
                marker: marker.name.clone(),
                value,
            });
        }
        Ok((MarkerValue::Numeric { value, qualifier }, !in_range))
    }

    fn unlisted(&self, name: &str, raw: &str) -> Result<MarkerValue, Rejection> {
        let Some((value, qualifier)) = parse_numeric(raw) else {
            return Err(Rejection::Unparseable {
                marker: name.to_string(),
                raw: raw.to_string(),
            });
        };
        let (low, high) = self.config.unlisted_value_range;
        if value < low || value > high {
            return Err(Rejection::OutOfRange {
                marker: name.to_string(),
                value,
            });
        }
        Ok(MarkerValue::Numeric { value, qualifier })
    }

    /// Range bounds, each attached only when it parses.
    fn reference_range(&self, candidate: &Candidate) -> (Option<Decimal>, Option<Decimal>) {
        let bound = |raw: &Option<String>| raw.as_deref().and_then(parse_numeric).map(|(v, _)| v);
        let mut low = bound(&candidate.raw_low);
        let mut high = bound(&candidate.raw_high);

        if let Some(range) = candidate.raw_range.as_deref() {
            let (range_low, range_high) = parse_range(range);
            low = low.or(range_low);
            high = high.or(range_high);
        }
        (low, high)
    }
}

/// Parse `95`, `1,250`, `<0.5`, `>= 60` into a decimal and its qualifier.
pub fn parse_numeric(raw: &str) -> Option<(Decimal, Option<Qualifier>)> {
    let caps = NUMERIC_VALUE.captures(raw.trim())?;
    let qualifier = caps.name("qual").and_then(|q| Qualifier::from_prefix(q.as_str()));
    let mut digits = caps["num"].replace(',', "");
    if digits.starts_with('.') {
        digits.insert(0, '0');
    }
    if caps.name("sign").is_some() {
        digits.insert(0, '-');
    }
    let value = Decimal::from_str(&digits).ok()?;
    Some((value, qualifier))
}

/// Parse reference range text into independent bounds.
///
/// `70-100`, `70 - 100`, `3.4 to 10.8`, `(70-100)`, `<200` (upper only),
/// `>39` (lower only). A malformed side yields `None` for that side alone.
pub fn parse_range(raw: &str) -> (Option<Decimal>, Option<Decimal>) {
    let text = raw
        .trim()
        .trim_start_matches(['(', '['])
        .trim_end_matches([')', ']'])
        .trim();

    if let Some(caps) = ONE_SIDED_RANGE.captures(text) {
        let bound = parse_numeric(&caps["bound"]).map(|(v, _)| v);
        return match &caps["op"] {
            "<" | "<=" => (None, bound),
            _ => (bound, None),
        };
    }

    if let Some(caps) = TWO_SIDED_RANGE.captures(text) {
        let low = parse_numeric(&caps["low"]).map(|(v, _)| v);
        let high = parse_numeric(&caps["high"]).map(|(v, _)| v);
        return (low, high);
    }

    (None, None)
}

/// Separate a trailing abnormal flag from the value text.
fn split_flag(raw: &str) -> (&str, Option<AbnormalFlag>) {
    let raw = raw.trim();
    match TRAILING_FLAG.captures(raw) {
        Some(caps) => {
            let flag = AbnormalFlag::from_token(&caps["flag"]);
            let value = caps.name("value").map_or(raw, |m| m.as_str());
            (value.trim(), flag)
        }
        None => (raw, None),
    }
}

fn categorical(marker: &MarkerDefinition, raw: &str) -> Result<MarkerValue, Rejection> {
    let key = normalize_key(raw);
    if let Some(allowed) = marker.allowed.iter().find(|a| normalize_key(a) == key) {
        return Ok(MarkerValue::Text(allowed.clone()));
    }
    Err(if parse_numeric(raw).is_some() {
        Rejection::WrongKind {
            marker: marker.name.clone(),
            raw: raw.to_string(),
        }
    } else {
        Rejection::NotAllowed {
            marker: marker.name.clone(),
            raw: raw.to_string(),
        }
    })
}

fn looks_textual(raw: &str) -> bool {
    raw.chars().any(char::is_alphabetic) && !raw.chars().any(|c| c.is_ascii_digit())
}

/// Display name for a marker missing from the catalog: punctuation dropped,
/// words capitalized.
fn display_name(label: &str) -> String {
    normalize_key(label)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
