//! Lab report parser composing the extraction stages.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace};

use super::{
    control_char_ratio, Classification, DateExtractor, FormatClassifier, PatternMatcher, Result,
    TextNormalizer, ValueValidator,
};
use crate::error::ExtractionError;
use crate::models::{Diagnostics, ExtractionConfig, ExtractionResult, ExtractionStatus, TestDate};
use crate::rules::{CompiledProfile, FormatId, RuleStore};

/// Trait for report parsing.
pub trait ReportParser {
    /// Extract records from report text.
    fn parse(&self, text: &str) -> Result<ExtractionResult>;
}

/// Rule-driven lab report parser.
///
/// Stateless per call: the rule store is shared read-only, so one parser can
/// serve any number of documents, from any number of threads.
#[derive(Debug, Clone)]
pub struct LabReportParser {
    rules: Arc<RuleStore>,
    config: ExtractionConfig,
    format_override: Option<FormatId>,
}

impl LabReportParser {
    /// Create a parser with default extraction settings.
    pub fn new(rules: Arc<RuleStore>) -> Self {
        Self {
            rules,
            config: ExtractionConfig::default(),
            format_override: None,
        }
    }

    /// Set extraction settings.
    pub fn with_config(mut self, config: ExtractionConfig) -> Self {
        self.config = config;
        self
    }

    /// Skip classification and always use the given profile.
    pub fn with_format_override(mut self, format: Option<FormatId>) -> Self {
        self.format_override = format;
        self
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    /// Parse raw bytes, which must be UTF-8 text.
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<ExtractionResult> {
        let text = std::str::from_utf8(bytes).map_err(|e| ExtractionError::Undecodable(e.valid_up_to()))?;
        self.parse(text)
    }

    /// Normalize and classify without extracting.
    pub fn classify(&self, text: &str) -> Classification {
        let normalized = TextNormalizer::new(&self.rules, &self.config).normalize(text);
        FormatClassifier::new(&self.rules).classify(&normalized.text)
    }

    fn forced_profile(&self) -> Result<Option<&CompiledProfile>> {
        match &self.format_override {
            Some(id) => self
                .rules
                .profile(id)
                .map(Some)
                .ok_or_else(|| ExtractionError::UnknownFormat(id.to_string())),
            None => Ok(None),
        }
    }
}

impl ReportParser for LabReportParser {
    fn parse(&self, text: &str) -> Result<ExtractionResult> {
        let start = Instant::now();
        let forced = self.forced_profile()?;

        let ratio = control_char_ratio(text);
        if ratio > self.config.max_control_char_ratio {
            return Err(ExtractionError::Unreadable(ratio));
        }

        if text.trim().is_empty() {
            let format = self.format_override.clone().unwrap_or_else(FormatId::unknown);
            return Ok(ExtractionResult::empty(
                format,
                TestDate::Unknown,
                Diagnostics::default(),
                "input text is empty",
            ));
        }

        info!("Parsing report from {} characters of text", text.len());

        let normalized = TextNormalizer::new(&self.rules, &self.config).normalize(text);
        let text = normalized.text.as_str();
        debug!(
            removed = normalized.removed_lines,
            joined = normalized.joined_lines,
            "normalized text"
        );

        let (format, profile) = match forced {
            Some(profile) => {
                debug!(format = %profile.id(), "using forced format");
                (profile.id().clone(), Some(profile))
            }
            None => {
                let classification = FormatClassifier::new(&self.rules).classify(text);
                let profile = self.rules.profile(&classification.format);
                (classification.format, profile)
            }
        };

        let outcome = PatternMatcher::new(&self.rules, &self.config).run(text, profile);
        let mut diagnostics = Diagnostics {
            candidates: outcome.candidates.len(),
            strategies_run: outcome.strategies_run,
            fallback_used: outcome.fallback_used,
            ..Diagnostics::default()
        };

        let validator = ValueValidator::new(&self.rules, &self.config);
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for candidate in &outcome.candidates {
            match validator.validate(candidate) {
                Ok(record) if seen.contains(&record.marker) => {
                    trace!(marker = %record.marker, offset = candidate.offset, "duplicate dropped");
                    diagnostics.duplicates += 1;
                }
                Ok(record) => {
                    seen.insert(record.marker.clone());
                    records.push(record);
                }
                Err(rejection) => {
                    debug!(label = %candidate.label, ?rejection, "candidate rejected");
                    if rejection.is_unresolved() {
                        diagnostics.unresolved += 1;
                    } else {
                        diagnostics.rejected += 1;
                    }
                    diagnostics.rejections.push(rejection);
                }
            }
        }

        let test_date = DateExtractor::new(&self.rules).extract(text);

        let empty_reason = if profile.is_none() {
            Some("no format profile matched".to_string())
        } else if diagnostics.candidates == 0 {
            Some("no candidate values found".to_string())
        } else if records.is_empty() {
            Some(format!("all {} candidates were rejected", diagnostics.candidates))
        } else {
            None
        };

        let result = match empty_reason {
            Some(reason) => ExtractionResult::empty(format, test_date, diagnostics, reason),
            None => ExtractionResult {
                records,
                test_date,
                format,
                status: ExtractionStatus::Success,
                diagnostics,
            },
        };

        info!(
            format = %result.format,
            records = result.records.len(),
            rejected = result.rejected_count(),
            test_date = %result.test_date,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "extraction finished"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AbnormalFlag, MarkerValue, Rejection};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const RULES: &str = r#"{
        "markers": [
            {"name": "Glucose", "min": 10, "max": 1000, "unit": "mg/dL"},
            {"name": "WBC", "min": 0.1, "max": 100},
            {"name": "Sodium", "min": 100, "max": 180},
            {"name": "TSH", "min": 0, "max": 10}
        ],
        "formats": [
            {"id": "pairs", "signals": {"any_of": ["lab report"]},
             "strategies": ["labeled_pair", "fragmented_adjacency"],
             "templates": {"labeled_pair": [
                "^(?P<marker>[A-Za-z][A-Za-z0-9 ,()/\\-]*?)\\s*(?:[:=]|\\.{2,})\\s*(?P<value>[<>]?\\d[\\d.]*)\\s*(?P<unit>[A-Za-z%/]+)?\\s*(?:\\((?P<range>[^)]*)\\))?$"
             ]}},
            {"id": "rows", "signals": {"any_of": ["cbc panel"]}, "strategies": ["table_row"],
             "templates": {"table_row": [
                "^(?P<marker>[A-Za-z][A-Za-z ]*?)\\s+(?P<low>\\d[\\d.]*)\\s+(?P<high>\\d[\\d.]*)\\s+(?P<value>\\d[\\d.]*)$"
             ]}}
        ]
    }"#;

    fn parser() -> LabReportParser {
        LabReportParser::new(Arc::new(RuleStore::from_json(RULES).unwrap()))
    }

    fn default_parser() -> LabReportParser {
        LabReportParser::new(Arc::new(RuleStore::embedded().unwrap()))
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn markers(result: &ExtractionResult) -> Vec<&str> {
        result.records.iter().map(|r| r.marker.as_str()).collect()
    }

    #[test]
    fn test_labeled_pair_with_range() {
        let result = parser().parse("Lab Report\nGlucose ......... 95 mg/dL (70-100)").unwrap();

        assert_eq!(result.status, ExtractionStatus::Success);
        assert_eq!(result.format.as_str(), "pairs");
        let glucose = result.record("Glucose").unwrap();
        assert_eq!(glucose.value, MarkerValue::numeric(dec("95")));
        assert_eq!(glucose.min_range, Some(dec("70")));
        assert_eq!(glucose.max_range, Some(dec("100")));
    }

    #[test]
    fn test_table_row_with_bounds() {
        let result = parser().parse("CBC Panel\nWBC 3.4 10.8 6.2").unwrap();

        let wbc = result.record("WBC").unwrap();
        assert_eq!(wbc.value.as_decimal(), Some(dec("6.2")));
        assert_eq!(wbc.min_range, Some(dec("3.4")));
        assert_eq!(wbc.max_range, Some(dec("10.8")));
    }

    #[test]
    fn test_unrecognized_text_is_empty_not_error() {
        let result = parser().parse("lorem ipsum dolor sit amet").unwrap();

        assert_eq!(result.status, ExtractionStatus::Empty);
        assert!(result.format.is_unknown());
        assert!(result.records.is_empty());
        assert_eq!(result.diagnostics.message.as_deref(), Some("no format profile matched"));
    }

    #[test]
    fn test_duplicate_keeps_earliest_occurrence() {
        let result = parser().parse("Lab Report\nGlucose\n88\nGlucose: 95").unwrap();

        assert!(result.diagnostics.fallback_used);
        assert_eq!(markers(&result), vec!["Glucose"]);
        assert_eq!(result.records[0].value.as_decimal(), Some(dec("88")));
        assert_eq!(result.diagnostics.duplicates, 1);
    }

    #[test]
    fn test_implausible_value_rejected_and_counted() {
        let result = parser().parse("Lab Report\nTSH: 450\nGlucose: 95").unwrap();

        assert_eq!(markers(&result), vec!["Glucose"]);
        assert_eq!(result.diagnostics.rejected, 1);
        assert_eq!(
            result.diagnostics.rejections,
            vec![Rejection::OutOfRange {
                marker: "TSH".to_string(),
                value: dec("450")
            }]
        );
    }

    #[test]
    fn test_all_rejected_is_empty_with_reason() {
        let result = parser().parse("Lab Report\nTSH: 450").unwrap();
        assert_eq!(result.status, ExtractionStatus::Empty);
        assert_eq!(result.diagnostics.message.as_deref(), Some("all 1 candidates were rejected"));

        let result = parser().parse("Lab Report\nnothing measured").unwrap();
        assert_eq!(result.diagnostics.message.as_deref(), Some("no candidate values found"));
    }

    #[test]
    fn test_source_order_and_uniqueness() {
        let text = "Lab Report\nSodium: 140\nGlucose: 95\nTSH: 2.1\nSodium: 139";
        let result = parser().parse(text).unwrap();

        assert_eq!(markers(&result), vec!["Sodium", "Glucose", "TSH"]);
        assert_eq!(result.record("Sodium").unwrap().value.as_decimal(), Some(dec("140")));
    }

    #[test]
    fn test_idempotent() {
        let text = "Lab Report\nCollected: 02/27/2025\nGlucose: 95 mg/dL (70-100)\nTSH: 450";
        let first = parser().parse(text).unwrap();
        let second = parser().parse(text).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_records_within_plausible_range() {
        let text = "Lab Report\nGlucose: 5\nSodium: 140\nTSH: 11\nWBC: 6.1";
        let parser = parser();
        let result = parser.parse(text).unwrap();
        for record in &result.records {
            let marker = parser.rules().marker(&record.marker).unwrap();
            let value = record.value.as_decimal().unwrap();
            assert!(marker.in_range(value), "{} = {}", record.marker, value);
        }
        assert_eq!(markers(&result), vec!["Sodium", "WBC"]);
    }

    #[test]
    fn test_date_unknown_without_match() {
        let result = parser().parse("Lab Report\nGlucose: 95").unwrap();
        assert_eq!(result.test_date, TestDate::Unknown);

        let result = parser().parse("Lab Report\nCollected: 02/27/2025\nGlucose: 95").unwrap();
        assert_eq!(
            result.test_date,
            TestDate::Known(NaiveDate::from_ymd_opt(2025, 2, 27).unwrap())
        );
    }

    #[test]
    fn test_forced_format_bypasses_classification() {
        let parser = parser();
        assert!(parser.classify("Glucose: 95").is_unknown());

        let forced = parser.with_format_override(Some(FormatId::new("pairs")));
        let result = forced.parse("Glucose: 95").unwrap();
        assert_eq!(result.format.as_str(), "pairs");
        assert_eq!(markers(&result), vec!["Glucose"]);
    }

    #[test]
    fn test_forced_unknown_profile_is_error() {
        let parser = parser().with_format_override(Some(FormatId::new("nope")));
        let err = parser.parse("Glucose: 95").unwrap_err();
        assert!(matches!(err, ExtractionError::UnknownFormat(id) if id == "nope"));
    }

    #[test]
    fn test_undecodable_and_unreadable_input() {
        let err = parser().parse_bytes(&[0x47, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, ExtractionError::Undecodable(1)));

        let binary = "\u{1}\u{2}\u{3}\u{4}ab";
        assert!(matches!(parser().parse(binary), Err(ExtractionError::Unreadable(_))));
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        let result = parser().parse(" \n\t \n").unwrap();
        assert_eq!(result.status, ExtractionStatus::Empty);
        assert_eq!(result.diagnostics.message.as_deref(), Some("input text is empty"));
    }

    #[test]
    fn test_labcorp_nmr_rows() {
        let text = "NMR LipoProfile\n\
                    LDL-P A, 01 1520 High nmol/L <1000\n\
                    HDL-P (Total) A, 01 32.1 uM >=30.5\n\
                    Date Collected: 02/27/2025";
        let result = default_parser().parse(text).unwrap();

        assert_eq!(result.format.as_str(), "labcorp_nmr");
        assert_eq!(markers(&result), vec!["LDL-P", "HDL-P (Total)"]);

        let ldl = &result.records[0];
        assert_eq!(ldl.value.as_decimal(), Some(dec("1520")));
        assert_eq!(ldl.flag, Some(AbnormalFlag::High));
        assert_eq!(ldl.unit.as_deref(), Some("nmol/L"));
        assert_eq!((ldl.min_range, ldl.max_range), (None, Some(dec("1000"))));

        let hdl = &result.records[1];
        assert_eq!((hdl.min_range, hdl.max_range), (Some(dec("30.5")), None));
        assert_eq!(result.test_date.to_string(), "2025-02-27");
    }

    #[test]
    fn test_quest_analyte_value_layout() {
        let text = "Quest Diagnostics\nAnalyte\nValue\nGlucose\n95\nReference Range: 65-99\n\
                    Sodium 140 mmol/L 135-146\nCollected: 01/15/2025";
        let result = default_parser().parse(text).unwrap();

        assert_eq!(result.format.as_str(), "quest_analyte_value");
        assert!(result.diagnostics.fallback_used);
        assert_eq!(markers(&result), vec!["Glucose", "Sodium"]);

        let glucose = &result.records[0];
        assert_eq!(glucose.value.as_decimal(), Some(dec("95")));
        assert_eq!((glucose.min_range, glucose.max_range), (Some(dec("65")), Some(dec("99"))));
        let sodium = &result.records[1];
        assert_eq!(sodium.unit.as_deref(), Some("mmol/L"));
        assert_eq!(sodium.max_range, Some(dec("146")));
        assert_eq!(result.test_date.to_string(), "2025-01-15");
    }

    #[test]
    fn test_cleveland_fatty_acids() {
        let text = "Cleveland HeartLab, Inc.\nOmegaCheck\n\
                    Omega-3 Total 5.2 >5.4 % by wt\n\
                    Arachidonic Acid/EPA Ratio 11.8 High <11.0";
        let result = default_parser().parse(text).unwrap();

        assert_eq!(result.format.as_str(), "cleveland_heartlab");
        assert_eq!(markers(&result), vec!["Omega-3 total", "Arachidonic Acid/EPA Ratio"]);
        assert_eq!(result.records[0].unit.as_deref(), Some("% by wt"));
        assert_eq!(result.records[0].min_range, Some(dec("5.4")));
        assert_eq!(result.records[1].flag, Some(AbnormalFlag::High));
        assert_eq!(result.records[1].max_range, Some(dec("11.0")));
    }

    #[test]
    fn test_quest_multi_word_units() {
        let text = "Quest Diagnostics\nAnalyte\nValue\n\
                    HEMOGLOBIN A1c 5.4 <5.7 % of total Hgb\n\
                    Glucose 88 65-99 mg/dL";
        let result = default_parser().parse(text).unwrap();

        assert_eq!(result.format.as_str(), "quest_analyte_value");
        assert_eq!(markers(&result), vec!["Hemoglobin A1c", "Glucose"]);
        let a1c = &result.records[0];
        assert_eq!(a1c.value.as_decimal(), Some(dec("5.4")));
        assert_eq!(a1c.unit.as_deref(), Some("% of total Hgb"));
        assert_eq!((a1c.min_range, a1c.max_range), (None, Some(dec("5.7"))));
        assert_eq!(result.records[1].unit.as_deref(), Some("mg/dL"));
    }

    #[test]
    fn test_standard_row_with_multi_word_unit() {
        let text = "Lab Report\nHemoglobin A1c 5.4 (4.8-5.6) % of total Hgb";
        let result = default_parser().parse(text).unwrap();

        assert_eq!(result.format.as_str(), "standard");
        let a1c = result.record("Hemoglobin A1c").unwrap();
        assert_eq!(a1c.unit.as_deref(), Some("% of total Hgb"));
        assert_eq!(a1c.max_range, Some(dec("5.6")));
    }

    #[test]
    fn test_boston_heart_tiered_rows() {
        let text = "Boston Heart Diagnostics\n\
                    200 Crossing Blvd. Framingham, MA 01702\n\
                    CLIA# 22D2100622\n\
                    Collected: 03/14/2024\n\
                    Total Cholesterol <200 200-240 >240 mg/dL 139\n\
                    HDL-C >50 40-50 <40 mg/dL 62\n\
                    Glucose\u{b2} 72\n\
                    hs-CRP 1.1 mg/L";
        let result = default_parser().parse(text).unwrap();

        assert_eq!(result.format.as_str(), "boston_heart");
        assert!(!result.diagnostics.fallback_used);
        assert_eq!(
            markers(&result),
            vec!["Cholesterol, Total", "HDL Cholesterol", "Glucose", "hs-CRP"]
        );
        let total = &result.records[0];
        assert_eq!(total.value.as_decimal(), Some(dec("139")));
        assert_eq!((total.min_range, total.max_range), (None, Some(dec("200"))));
        assert_eq!(total.unit.as_deref(), Some("mg/dL"));
        assert_eq!(result.records[1].min_range, Some(dec("50")));
        assert_eq!(result.records[2].value.as_decimal(), Some(dec("72")));
        assert_eq!(result.records[3].unit.as_deref(), Some("mg/L"));
        assert_eq!(result.test_date.to_string(), "2024-03-14");
    }

    #[test]
    fn test_function_health_dashboard() {
        let text = "6/16/25, 4:07 PM Function Dashboard\n\
                    https://my.functionhealth.com/biomarkers\n\
                    112 Biomarkers\n\
                    In Range Out of Range Improving\n\
                    Blood\n\
                    Hemoglobin\n\
                    In Range 14.3 g/dL\n\
                    Ferritin\n\
                    Above Range 412 ng/mL\n\
                    Magnesium\n\
                    In Range 4.7 mg/dL (calc)\n\
                    Urine Glucose\n\
                    In Range Negative";
        let result = default_parser().parse(text).unwrap();

        assert_eq!(result.format.as_str(), "function_health");
        assert_eq!(
            markers(&result),
            vec!["Hemoglobin", "Ferritin", "Magnesium", "Urine Glucose"]
        );
        assert_eq!(result.records[0].value.as_decimal(), Some(dec("14.3")));
        assert_eq!(result.records[0].flag, None);
        let ferritin = &result.records[1];
        assert_eq!(ferritin.flag, Some(AbnormalFlag::High));
        assert_eq!(ferritin.unit.as_deref(), Some("ng/mL"));
        assert_eq!((ferritin.min_range, ferritin.max_range), (None, None));
        assert_eq!(result.records[2].value.as_decimal(), Some(dec("4.7")));
        assert_eq!(result.records[3].value, MarkerValue::Text("Negative".to_string()));
        assert_eq!(result.test_date.to_string(), "2025-06-16");
    }

    #[test]
    fn test_header_rows_do_not_block_fragmented_recovery() {
        let text = "Laboratory Report\nRoom 12\nBed 3\nVisit 2\nGlucose\n95\nSodium\n140";
        let result = default_parser().parse(text).unwrap();

        assert_eq!(result.status, ExtractionStatus::Success);
        assert!(result.diagnostics.fallback_used);
        assert_eq!(markers(&result), vec!["Glucose", "Sodium"]);
        assert_eq!(result.diagnostics.unresolved, 3);
    }

    #[test]
    fn test_standard_labeled_report() {
        let text = "Laboratory Report\n\
                    Glucose: 95 mg/dL (65-99)\n\
                    Hemoglobin A1c = 5.4 % (4.8-5.6)\n\
                    Cholesterol, Total ..... 182 mg/dL\n\
                    HIV 1/2 Ab: Non-Reactive\n\
                    Reported: 2024-06-01";
        let result = default_parser().parse(text).unwrap();

        assert_eq!(result.format.as_str(), "standard");
        assert!(!result.diagnostics.fallback_used);
        assert_eq!(
            markers(&result),
            vec!["Glucose", "Hemoglobin A1c", "Cholesterol, Total", "HIV Screen"]
        );
        assert_eq!(result.records[1].unit.as_deref(), Some("%"));
        assert_eq!(result.records[3].value, MarkerValue::Text("Non-Reactive".to_string()));
        assert_eq!(result.test_date.to_string(), "2024-06-01");

        let table = result.to_table(true);
        assert_eq!(table.header, vec!["Marker Name", "MinRange", "MaxRange", "2024-06-01"]);
        assert_eq!(table.rows[0], vec!["Glucose", "65", "99", "95"]);
    }
}
