//! Text cleanup ahead of classification and matching.

use std::collections::HashMap;

use tracing::debug;

use crate::models::ExtractionConfig;
use crate::rules::RuleStore;

/// Normalized text plus what the cleanup did to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    /// Cleaned text, one logical line per `\n`.
    pub text: String,
    /// Lines dropped as blank, noise or boilerplate.
    pub removed_lines: usize,
    /// Lines merged into their predecessor.
    pub joined_lines: usize,
}

/// Cleans raw report text.
///
/// Pipeline: line endings, whitespace and glyph folding, trimming, blank and
/// noise line removal, repeated boilerplate removal, broken line rejoining.
pub struct TextNormalizer<'a> {
    rules: &'a RuleStore,
    config: &'a ExtractionConfig,
}

impl<'a> TextNormalizer<'a> {
    pub fn new(rules: &'a RuleStore, config: &'a ExtractionConfig) -> Self {
        Self { rules, config }
    }

    pub fn normalize(&self, raw: &str) -> NormalizedText {
        let folded = fold_characters(raw);
        let exclusions = self.rules.exclusions();

        let mut removed_lines = 0;
        let mut lines: Vec<String> = Vec::new();
        for line in folded.split('\n') {
            let line = line.trim();
            if line.is_empty() || exclusions.is_noise(line) {
                removed_lines += 1;
                continue;
            }
            lines.push(line.to_string());
        }

        if self.config.strip_repeated_lines {
            let before = lines.len();
            lines = self.strip_repeated(lines);
            removed_lines += before - lines.len();
        }

        let mut joined_lines = 0;
        if self.config.rejoin_broken_lines {
            let before = lines.len();
            lines = rejoin(lines);
            joined_lines = before - lines.len();
        }

        debug!(removed_lines, joined_lines, lines = lines.len(), "text normalized");

        NormalizedText {
            text: lines.join("\n"),
            removed_lines,
            joined_lines,
        }
    }

    fn strip_repeated(&self, lines: Vec<String>) -> Vec<String> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for line in &lines {
            if line.len() >= self.config.repeated_line_min_length {
                *counts.entry(line.as_str()).or_default() += 1;
            }
        }

        let repeated: Vec<String> = counts
            .into_iter()
            .filter(|(_, count)| *count >= self.config.repeated_line_min_count)
            .map(|(line, _)| line.to_string())
            .collect();
        if repeated.is_empty() {
            return lines;
        }

        lines
            .into_iter()
            .filter(|line| !repeated.contains(line))
            .collect()
    }
}

/// Unify line endings, fold horizontal whitespace to single spaces and map
/// typographic glyphs to ASCII.
fn fold_characters(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut last_space = false;

    for c in unified.chars() {
        let mapped: &str = match c {
            '\n' => "\n",
            '\u{feff}' | '\u{200b}' | '\u{00ad}' => continue,
            '\u{2010}'..='\u{2015}' | '\u{2212}' => "-",
            '\u{2264}' => "<=",
            '\u{2265}' => ">=",
            '\u{2018}' | '\u{2019}' => "'",
            '\u{201c}' | '\u{201d}' => "\"",
            c if c.is_whitespace() => " ",
            _ => {
                out.push(c);
                last_space = false;
                continue;
            }
        };

        if mapped == " " {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push_str(mapped);
            last_space = false;
        }
    }
    out
}

/// Merge lines the document reader split in the middle of a token.
fn rejoin(lines: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        match out.last().and_then(|prev| join_kind(prev, &line)) {
            Some(join) => {
                if let Some(prev) = out.last_mut() {
                    join.apply(prev, &line);
                }
            }
            None => out.push(line),
        }
    }
    out
}

enum Join {
    DropHyphen,
    KeepHyphen,
    Space,
}

impl Join {
    fn apply(self, prev: &mut String, next: &str) {
        match self {
            Join::DropHyphen => {
                prev.pop();
            }
            Join::KeepHyphen => {}
            Join::Space => prev.push(' '),
        }
        prev.push_str(next);
    }
}

fn join_kind(prev: &str, next: &str) -> Option<Join> {
    let first = next.chars().next()?;
    let mut tail = prev.chars().rev();

    if let (Some('-'), Some(before)) = (tail.next(), tail.next()) {
        if before.is_alphabetic() && first.is_alphabetic() {
            return Some(if first.is_lowercase() {
                Join::DropHyphen
            } else {
                Join::KeepHyphen
            });
        }
    }

    if prev.ends_with(',') || prev.matches('(').count() > prev.matches(')').count() {
        return Some(Join::Space);
    }
    None
}

/// Share of characters that are control characters other than line breaks
/// and tabs.
pub fn control_char_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut control = 0usize;
    for c in text.chars() {
        total += 1;
        if c.is_control() && !matches!(c, '\n' | '\r' | '\t') {
            control += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        control as f64 / total as f64
    }
}
