//! Format classification from textual and structural signals.

use tracing::debug;

use super::patterns::SINGLE_WORD_LINE;
use crate::rules::{CompiledProfile, FormatId, RuleStore};

/// Outcome of classifying one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Winning profile, or the `unknown` sentinel.
    pub format: FormatId,
    /// Specificity of the winning profile.
    pub specificity: usize,
    /// Signals the winning profile matched, for display.
    pub signals: Vec<String>,
    /// Every profile whose signals matched, in declared order.
    pub matched: Vec<FormatId>,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            format: FormatId::unknown(),
            specificity: 0,
            signals: Vec::new(),
            matched: Vec::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.format.is_unknown()
    }
}

/// Line statistics behind the structural cues.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextShape {
    pub lines: usize,
    pub single_word_ratio: f64,
}

impl TextShape {
    pub fn of(text: &str) -> Self {
        let mut lines = 0usize;
        let mut single = 0usize;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            lines += 1;
            if SINGLE_WORD_LINE.is_match(line) {
                single += 1;
            }
        }
        let single_word_ratio = if lines == 0 {
            0.0
        } else {
            single as f64 / lines as f64
        };
        Self {
            lines,
            single_word_ratio,
        }
    }
}

/// Picks the format profile whose signals best describe a text.
///
/// Matching profiles compete on specificity (number of positive signals);
/// ties go to the profile declared first in the catalog. Profiles without
/// positive signals are never picked automatically.
pub struct FormatClassifier<'a> {
    rules: &'a RuleStore,
}

impl<'a> FormatClassifier<'a> {
    pub fn new(rules: &'a RuleStore) -> Self {
        Self { rules }
    }

    pub fn classify(&self, text: &str) -> Classification {
        let lower = text.to_lowercase();
        let shape = TextShape::of(text);

        let mut best: Option<(&CompiledProfile, Vec<String>)> = None;
        let mut matched = Vec::new();

        for profile in self.rules.profiles() {
            let Some(signals) = evaluate(profile, text, &lower, shape) else {
                continue;
            };
            matched.push(profile.id().clone());

            let better = best
                .as_ref()
                .is_none_or(|(current, _)| profile.specificity() > current.specificity());
            if better {
                best = Some((profile, signals));
            }
        }

        let classification = match best {
            Some((profile, signals)) => Classification {
                format: profile.id().clone(),
                specificity: profile.specificity(),
                signals,
                matched,
            },
            None => Classification::unknown(),
        };

        debug!(
            format = %classification.format,
            specificity = classification.specificity,
            candidates = classification.matched.len(),
            lines = shape.lines,
            "classified document"
        );
        classification
    }
}

/// Evaluate one profile; returns the matched signal descriptions when every
/// condition holds.
fn evaluate(profile: &CompiledProfile, text: &str, lower: &str, shape: TextShape) -> Option<Vec<String>> {
    if profile.specificity() == 0 {
        return None;
    }

    let mut hits = Vec::new();

    for needle in profile.required() {
        if !lower.contains(needle.as_str()) {
            return None;
        }
        hits.push(format!("contains \"{}\"", needle));
    }

    if !profile.any_of().is_empty() {
        let found = profile.any_of().iter().find(|n| lower.contains(n.as_str()))?;
        hits.push(format!("contains \"{}\"", found));
    }

    if let Some(bad) = profile.forbidden().iter().find(|n| lower.contains(n.as_str())) {
        debug!(format = %profile.id(), forbidden = %bad, "profile excluded");
        return None;
    }

    for pattern in profile.signal_patterns() {
        if !pattern.is_match(text) {
            return None;
        }
        hits.push(format!("matches /{}/", pattern.as_str()));
    }

    let signals = &profile.profile().signals;
    if let Some(min_lines) = signals.min_lines {
        if shape.lines < min_lines {
            return None;
        }
        hits.push(format!("{} lines (>= {})", shape.lines, min_lines));
    }
    if let Some(min_ratio) = signals.min_single_word_ratio {
        if shape.single_word_ratio <= min_ratio {
            return None;
        }
        hits.push(format!(
            "single-word line ratio {:.2} (> {:.2})",
            shape.single_word_ratio, min_ratio
        ));
    }

    Some(hits)
}
