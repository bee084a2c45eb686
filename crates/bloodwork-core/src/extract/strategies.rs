//! Extraction strategies producing candidates from normalized text.

use regex::Captures;

use super::patterns::{
    lines_with_offsets, BARE_RANGE_LINE, LABEL_LINE, REFERENCE_RANGE_LINE, VALUE_LINE, WORD_VALUE,
};
use super::Candidate;
use crate::models::{ExtractionConfig, StrategyKind};
use crate::rules::{CompiledProfile, RuleStore};

/// Everything a strategy needs to scan one document.
pub struct MatchContext<'a> {
    pub lines: Vec<(usize, &'a str)>,
    pub profile: &'a CompiledProfile,
    pub rules: &'a RuleStore,
    pub config: &'a ExtractionConfig,
}

impl<'a> MatchContext<'a> {
    pub fn new(
        text: &'a str,
        profile: &'a CompiledProfile,
        rules: &'a RuleStore,
        config: &'a ExtractionConfig,
    ) -> Self {
        Self {
            lines: lines_with_offsets(text),
            profile,
            rules,
            config,
        }
    }

    /// Long enough, has a letter, and contains no excluded word.
    fn label_is_plausible(&self, label: &str) -> bool {
        label.chars().count() >= self.config.min_marker_length
            && label.chars().any(char::is_alphabetic)
            && !self.rules.exclusions().has_excluded_word(label)
    }

    /// Resolves to a catalog marker, or unlisted markers are accepted.
    fn label_is_known(&self, label: &str) -> bool {
        self.config.accept_unlisted_markers || self.rules.resolve(label).is_some()
    }

    fn skips_line(&self, line: &str) -> bool {
        line.is_empty() || self.rules.exclusions().is_excluded_line(line)
    }
}

/// One way of finding marker/value pairs.
pub trait Strategy {
    fn kind(&self) -> StrategyKind;

    /// Candidates found in the document, in source order.
    fn collect(&self, ctx: &MatchContext<'_>) -> Vec<Candidate>;
}

/// Line-by-line matching against the profile's regex templates.
///
/// Serves both the labeled-pair and the table-row strategy; the first template
/// that yields a plausible label wins for a given line.
pub struct TemplateStrategy {
    kind: StrategyKind,
}

impl TemplateStrategy {
    pub fn labeled_pair() -> Self {
        Self {
            kind: StrategyKind::LabeledPair,
        }
    }

    pub fn table_row() -> Self {
        Self {
            kind: StrategyKind::TableRow,
        }
    }

    fn candidate(&self, ctx: &MatchContext<'_>, offset: usize, caps: &Captures<'_>) -> Option<Candidate> {
        let marker = caps.name("marker")?;
        let label = clean_label(marker.as_str());
        if !ctx.label_is_plausible(label) {
            return None;
        }
        // labels in free-form pairs must name a marker, table columns are
        // checked later by the validator
        if self.kind == StrategyKind::LabeledPair && !ctx.label_is_known(label) {
            return None;
        }

        let value = group(caps, "value")?;
        let mut candidate = Candidate::new(
            label,
            value,
            offset + marker.start(),
            self.kind,
            ctx.profile.id().clone(),
        )
        .with_bounds(
            group(caps, "low").map(str::to_string),
            group(caps, "high").map(str::to_string),
        );

        if let Some(range) = group(caps, "range") {
            candidate = candidate.with_range(range);
        }
        if let Some(unit) = group(caps, "unit") {
            candidate = candidate.with_unit(unit);
        }
        if let Some(flag) = group(caps, "flag") {
            candidate = candidate.with_flag(flag);
        }
        Some(candidate)
    }
}

impl Strategy for TemplateStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn collect(&self, ctx: &MatchContext<'_>) -> Vec<Candidate> {
        let templates = ctx.profile.templates(self.kind);
        let mut out = Vec::new();

        for &(offset, line) in &ctx.lines {
            if ctx.skips_line(line) {
                continue;
            }
            let found = templates
                .iter()
                .filter_map(|re| re.captures(line))
                .find_map(|caps| self.candidate(ctx, offset, &caps));
            if let Some(candidate) = found {
                out.push(candidate);
            }
        }
        out
    }
}

/// Recovers pairs whose label and value landed on separate lines.
///
/// A plausible label line is paired with the first value line within the
/// lookahead window, unless another label comes first. A reference range or
/// unit line following the value is attached to the same candidate.
pub struct FragmentedStrategy;

impl FragmentedStrategy {
    fn is_label(&self, ctx: &MatchContext<'_>, line: &str) -> bool {
        !ctx.skips_line(line)
            && !ctx.rules.exclusions().is_unit(line)
            && LABEL_LINE.is_match(line)
            && line.split_whitespace().count() <= ctx.config.max_label_words
            && ctx.label_is_plausible(line)
            && ctx.label_is_known(line)
    }

    /// Parse a value line, which may start with one of the profile's status
    /// words. Text values are only taken after a status word.
    fn value_line<'t>(&self, ctx: &MatchContext<'_>, line: &'t str) -> Option<ValueLine<'t>> {
        let (rest, status) = match ctx.profile.strip_status(line) {
            Some((rest, flag)) => (rest, Some(flag)),
            None => (line, None),
        };
        let status_flag: Option<&'t str> = status.flatten().map(|flag| flag.token());

        if let Some(caps) = VALUE_LINE.captures(rest) {
            return Some(ValueLine {
                value: caps.name("value")?.as_str(),
                flag: status_flag.or_else(|| caps.name("flag").map(|m| m.as_str())),
                unit: caps.name("unit").map(|m| m.as_str()),
            });
        }
        if status.is_some() && WORD_VALUE.is_match(rest) {
            return Some(ValueLine {
                value: rest,
                flag: status_flag,
                unit: None,
            });
        }
        None
    }

    fn range_in(line: &str) -> Option<String> {
        if let Some(caps) = REFERENCE_RANGE_LINE.captures(line) {
            return Some(caps["range"].trim().to_string());
        }
        let looks_like_range = line.starts_with(['<', '>', '(']) || line.contains('-');
        match BARE_RANGE_LINE.captures(line) {
            Some(caps) if looks_like_range => Some(caps["range"].to_string()),
            _ => None,
        }
    }
}

impl Strategy for FragmentedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FragmentedAdjacency
    }

    fn collect(&self, ctx: &MatchContext<'_>) -> Vec<Candidate> {
        let lines = &ctx.lines;
        let window = ctx.config.value_lookahead_lines;
        let mut out = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let (offset, label) = lines[i];
            if !self.is_label(ctx, label) {
                i += 1;
                continue;
            }

            let last = (i + window).min(lines.len().saturating_sub(1));
            let mut found = None;
            for j in i + 1..=last {
                let line = lines[j].1;
                if let Some(value) = self.value_line(ctx, line) {
                    found = Some((j, value));
                    break;
                }
                if self.is_label(ctx, line) {
                    break;
                }
            }

            let Some((j, value)) = found else {
                i += 1;
                continue;
            };

            let mut candidate = Candidate::new(
                label,
                value.value,
                offset,
                StrategyKind::FragmentedAdjacency,
                ctx.profile.id().clone(),
            );
            if let Some(flag) = value.flag {
                candidate = candidate.with_flag(flag);
            }
            if let Some(unit) = value.unit {
                candidate = candidate.with_unit(unit);
            }

            let tail_end = (j + window).min(lines.len().saturating_sub(1));
            for k in j + 1..=tail_end {
                let line = lines[k].1;
                if let Some(range) = Self::range_in(line) {
                    candidate = candidate.with_range(range);
                    break;
                }
                if candidate.unit.is_none() && ctx.rules.exclusions().is_unit(line) {
                    candidate = candidate.with_unit(line);
                    continue;
                }
                if self.value_line(ctx, line).is_some() || self.is_label(ctx, line) {
                    break;
                }
            }

            out.push(candidate);
            i = j + 1;
        }
        out
    }
}

/// Value half of a fragmented pair.
struct ValueLine<'t> {
    value: &'t str,
    flag: Option<&'t str>,
    unit: Option<&'t str>,
}

/// Strip separators, footnote superscripts and stray punctuation around a
/// captured label.
fn clean_label(raw: &str) -> &str {
    raw.trim()
        .trim_end_matches(['¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹', '⁰'])
        .trim_end_matches([',', ';', ':', '.'])
        .trim_end()
}

fn group<'t>(caps: &Captures<'t>, name: &str) -> Option<&'t str> {
    caps.name(name).map(|m| m.as_str().trim()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::FormatId;

    const RULES: &str = r#"{
        "markers": [
            {"name": "Glucose", "min": 10, "max": 1000},
            {"name": "WBC", "aliases": ["White Blood Cells"]},
            {"name": "Sodium"},
            {"name": "HDL Cholesterol", "aliases": ["HDL-C"]}
        ],
        "formats": [
            {"id": "pairs", "strategies": ["labeled_pair"],
             "templates": {"labeled_pair": [
                "^(?P<marker>[A-Za-z][A-Za-z0-9 ,()/\\-]*?)\\s*(?:[:=]|\\.{2,})\\s*(?P<value>[<>]?\\d[\\d.]*)\\s*(?P<unit>[A-Za-z%/]+)?\\s*(?:\\((?P<range>[^)]*)\\))?$"
             ]}},
            {"id": "rows", "strategies": ["table_row"],
             "templates": {"table_row": [
                "^(?P<marker>[A-Za-z][A-Za-z ¹²³]*?)\\s+(?P<low>\\d[\\d.]*)\\s+(?P<high>\\d[\\d.]*)\\s+(?P<value>\\d[\\d.]*)$"
             ]}},
            {"id": "fragments", "strategies": ["fragmented_adjacency"]},
            {"id": "status", "strategies": ["fragmented_adjacency"],
             "status_prefixes": [{"text": "In Range"}, {"text": "Above Range", "flag": "high"}]}
        ],
        "exclusions": {"line_keywords": ["disclaimer"], "label_words": ["patient"], "unit_tokens": ["mg/dL", "mmol/L"]}
    }"#;

    fn run(strategy: &dyn Strategy, profile: &str, text: &str) -> Vec<Candidate> {
        let rules = RuleStore::from_json(RULES).unwrap();
        let config = ExtractionConfig::default();
        let profile = rules.profile(&FormatId::new(profile)).unwrap();
        let ctx = MatchContext::new(text, profile, &rules, &config);
        strategy.collect(&ctx)
    }

    #[test]
    fn test_labeled_pair_with_dotted_leader() {
        let found = run(
            &TemplateStrategy::labeled_pair(),
            "pairs",
            "Report\nGlucose ......... 95 mg/dL (70-100)",
        );
        assert_eq!(found.len(), 1);
        let c = &found[0];
        assert_eq!(c.label, "Glucose");
        assert_eq!(c.raw_value, "95");
        assert_eq!(c.unit.as_deref(), Some("mg/dL"));
        assert_eq!(c.raw_range.as_deref(), Some("70-100"));
        assert_eq!(c.offset, 7);
        assert_eq!(c.strategy, StrategyKind::LabeledPair);
    }

    #[test]
    fn test_labeled_pair_skips_unknown_and_excluded() {
        let text = "Patient Glucose: 12\nColor: 5\nDisclaimer Glucose: 40\nWhite Blood Cells = 6.1";
        let found = run(&TemplateStrategy::labeled_pair(), "pairs", text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "White Blood Cells");
    }

    #[test]
    fn test_table_row_bounds_before_value() {
        let found = run(&TemplateStrategy::table_row(), "rows", "WBC 3.4 10.8 6.2");
        assert_eq!(found.len(), 1);
        let c = &found[0];
        assert_eq!((c.label.as_str(), c.raw_value.as_str()), ("WBC", "6.2"));
        assert_eq!(c.raw_low.as_deref(), Some("3.4"));
        assert_eq!(c.raw_high.as_deref(), Some("10.8"));
    }

    #[test]
    fn test_table_row_keeps_unresolved_labels() {
        let found = run(&TemplateStrategy::table_row(), "rows", "Mystery 1 2 3");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "Mystery");
    }

    #[test]
    fn test_fragmented_pairs_adjacent_lines() {
        let text = "Analyte\nValue\nGlucose\n95\nReference Range: 65-99\nSodium\nmmol/L\n140\nHDL-C\nWBC\n6.2 H";
        let found = run(&FragmentedStrategy, "fragments", text);
        let labels: Vec<&str> = found.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Glucose", "Sodium", "WBC"]);

        assert_eq!(found[0].raw_value, "95");
        assert_eq!(found[0].raw_range.as_deref(), Some("65-99"));
        assert_eq!(found[0].offset, text.find("Glucose").unwrap());
        assert_eq!(found[1].raw_value, "140");
        assert_eq!(found[2].flag.as_deref(), Some("H"));
    }

    #[test]
    fn test_fragmented_status_prefixes() {
        let text = "In Range Out of Range Improving\nGlucose\nAbove Range 212 mg/dL\nSodium\nIn Range 140 mmol/L (calc)\nWBC\nIn Range Negative";
        let found = run(&FragmentedStrategy, "status", text);
        let values: Vec<(&str, &str)> = found
            .iter()
            .map(|c| (c.label.as_str(), c.raw_value.as_str()))
            .collect();
        assert_eq!(values, vec![("Glucose", "212"), ("Sodium", "140"), ("WBC", "Negative")]);
        assert_eq!(found[0].flag.as_deref(), Some("high"));
        assert_eq!(found[0].unit.as_deref(), Some("mg/dL"));
        assert_eq!(found[1].flag, None);
        assert_eq!(found[1].unit.as_deref(), Some("mmol/L"));

        // without the profile's status words the same lines carry no values
        assert!(run(&FragmentedStrategy, "fragments", text).is_empty());
    }

    #[test]
    fn test_row_label_drops_footnote_marks() {
        let found = run(&TemplateStrategy::table_row(), "rows", "Glucose² 65 99 72");
        assert_eq!(found[0].label, "Glucose");
    }

    #[test]
    fn test_fragmented_respects_lookahead() {
        let text = "Glucose\nnote one\nnote two\nnote three\nnote four\n95";
        assert!(run(&FragmentedStrategy, "fragments", text).is_empty());
    }
}
