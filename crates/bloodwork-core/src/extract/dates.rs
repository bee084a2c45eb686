//! Test-date inference.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use regex::Captures;
use tracing::debug;

use super::patterns::lines_with_offsets;
use crate::models::TestDate;
use crate::rules::{DateOrder, RuleStore};

/// Keyword on the same line, shortly before the date.
const SAME_LINE: u32 = 3;
/// Keyword on the line above the date.
const PREVIOUS_LINE: u32 = 2;
const PROXIMITY_WEIGHT: u32 = 1000;

/// A date found in the text, with its score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateCandidate {
    pub date: NaiveDate,
    /// Byte offset of the match in the normalized text.
    pub offset: usize,
    pub proximity: u32,
    pub score: u32,
}

/// Picks the report's test date.
///
/// Keyword proximity outweighs frequency; among equal scores the earliest
/// match wins. Dates on lines naming a birth date are never considered.
pub struct DateExtractor<'a> {
    rules: &'a RuleStore,
}

impl<'a> DateExtractor<'a> {
    pub fn new(rules: &'a RuleStore) -> Self {
        Self { rules }
    }

    pub fn extract(&self, text: &str) -> TestDate {
        let candidates = self.candidates(text);
        let best = candidates
            .iter()
            .min_by_key(|c| (std::cmp::Reverse(c.score), c.offset));

        match best {
            Some(best) => {
                debug!(date = %best.date, score = best.score, found = candidates.len(), "test date");
                TestDate::Known(best.date)
            }
            None => {
                debug!("no test date found");
                TestDate::Unknown
            }
        }
    }

    /// Every qualifying date in source order, scored.
    pub fn candidates(&self, text: &str) -> Vec<DateCandidate> {
        let spec = self.rules.dates();
        let keywords: Vec<String> = spec.keywords.iter().map(|k| k.to_lowercase()).collect();
        let ignored: Vec<String> = spec.ignore_keywords.iter().map(|k| k.to_lowercase()).collect();

        let mut found: Vec<DateCandidate> = Vec::new();
        let mut previous = String::new();

        for (line_offset, line) in lines_with_offsets(text) {
            let lower = line.to_lowercase();
            if !ignored.iter().any(|k| lower.contains(k.as_str())) {
                for pattern in self.rules.date_patterns() {
                    for caps in pattern.regex.captures_iter(line) {
                        let Some(whole) = caps.get(0) else { continue };
                        let Some(date) = convert(&caps, pattern.order) else { continue };
                        let offset = line_offset + whole.start();
                        if found.iter().any(|c| c.offset == offset) {
                            continue;
                        }

                        let proximity = if keyword_before(line, whole.start(), &keywords, spec.keyword_window) {
                            SAME_LINE
                        } else if keywords.iter().any(|k| previous.contains(k.as_str())) {
                            PREVIOUS_LINE
                        } else {
                            0
                        };
                        found.push(DateCandidate {
                            date,
                            offset,
                            proximity,
                            score: 0,
                        });
                    }
                }
            }
            previous = lower;
        }

        let mut counts: HashMap<NaiveDate, u32> = HashMap::new();
        for c in &found {
            *counts.entry(c.date).or_default() += 1;
        }
        for c in &mut found {
            c.score = c.proximity * PROXIMITY_WEIGHT + counts.get(&c.date).copied().unwrap_or(0);
        }
        found.sort_by_key(|c| c.offset);
        found
    }
}

/// A keyword ends within `window` bytes before `start` on the same line.
fn keyword_before(line: &str, start: usize, keywords: &[String], window: usize) -> bool {
    let head = line.get(..start).unwrap_or_default().to_lowercase();
    keywords.iter().any(|k| {
        head.rmatch_indices(k.as_str())
            .next()
            .is_some_and(|(at, _)| head.len() - (at + k.len()) <= window)
    })
}

fn convert(caps: &Captures<'_>, order: DateOrder) -> Option<NaiveDate> {
    let part = |i: usize| caps.get(i).map(|m| m.as_str());
    let number = |i: usize| part(i).and_then(|s| s.parse::<u32>().ok());

    let (year, month, day) = match order {
        DateOrder::Mdy => (parse_year(part(3)?)?, number(1)?, number(2)?),
        DateOrder::Dmy => (parse_year(part(3)?)?, number(2)?, number(1)?),
        DateOrder::Ymd => (parse_year(part(1)?)?, number(2)?, number(3)?),
        DateOrder::MonthNameMdy => (parse_year(part(3)?)?, month_number(part(1)?)?, number(2)?),
        DateOrder::MonthNameDmy => (parse_year(part(3)?)?, month_number(part(2)?)?, number(1)?),
    };

    NaiveDate::from_ymd_opt(year, month, day).filter(|d| (1900..=2100).contains(&d.year()))
}

fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    Some(match (s.len(), year) {
        (2, 0..=50) => 2000 + year,
        (2, _) => 1900 + year,
        _ => year,
    })
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).flat_map(char::to_lowercase).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
