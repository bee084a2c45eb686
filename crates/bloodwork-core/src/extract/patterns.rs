//! Fixed regex patterns shared by the extraction stages.
//!
//! Vendor layouts live in the rule catalog; these only describe the shape of
//! numbers, ranges and lines common to every report.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // `<0.5`, `>= 60`, `1,250`, `.8`, `-2.0`
    pub static ref NUMERIC_VALUE: Regex = Regex::new(
        r"^(?P<qual><=|>=|=<|=>|<|>)?\s*(?P<sign>-)?(?P<num>\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?|\.\d+)$"
    ).unwrap();

    // Abnormal flag glued to the end of a value: `95 H`, `12.1 High`
    pub static ref TRAILING_FLAG: Regex = Regex::new(
        r"(?i)^(?P<value>.*?\d)\s*(?P<flag>\bhigh\b|\blow\b|\babnormal\b|\bcritical\b|\bhh\b|\bll\b|\bh\b|\bl\b|\ba\b|\*)$"
    ).unwrap();

    // One-sided reference ranges: `<1000`, `>=39`
    pub static ref ONE_SIDED_RANGE: Regex = Regex::new(
        r"^(?P<op><=|>=|<|>)\s*(?P<bound>\S+)$"
    ).unwrap();

    // Two-sided reference ranges: `70-100`, `70 - 100`, `3.4 to 10.8`, `-2.0-2.0`
    pub static ref TWO_SIDED_RANGE: Regex = Regex::new(
        r"(?i)^(?P<low>-?[^\s-]+?)\s*(?:-|\bto\b)\s*(?P<high>-?\S+)$"
    ).unwrap();

    // A line holding only a value, optionally followed by a flag, a unit and
    // a parenthesized note such as `(calc)`
    pub static ref VALUE_LINE: Regex = Regex::new(
        r"^(?P<value>(?:[<>]=?\s*)?\d[\d,]*(?:\.\d+)?)(?:\s+(?P<flag>High|Low|Abnormal|Critical|H|L|A))?(?:\s+(?P<unit>[A-Za-z%µ][A-Za-z0-9%µ/.^*]*(?:\s+by\s+wt)?))?(?:\s+\([^()]*\))?$"
    ).unwrap();

    // A single qualitative result word: `Negative`, `Non-Reactive`
    pub static ref WORD_VALUE: Regex = Regex::new(r"^[A-Za-z][A-Za-z\-]*$").unwrap();

    // `Reference Range: 65-99` below a fragmented value
    pub static ref REFERENCE_RANGE_LINE: Regex = Regex::new(
        r"(?i)^reference\s+(?:range|interval)\s*:?\s*(?P<range>.+)$"
    ).unwrap();

    // A line holding only a range: `(70-100)`, `<200`
    pub static ref BARE_RANGE_LINE: Regex = Regex::new(
        r"^\(?(?P<range>(?:[<>]=?\s*)?\d[\d,]*(?:\.\d+)?(?:\s*-\s*\d[\d,]*(?:\.\d+)?)?)\)?$"
    ).unwrap();

    // Plausible marker label for the fragmented strategy
    pub static ref LABEL_LINE: Regex = Regex::new(
        r"^[A-Za-z][A-Za-z0-9 ,()/%+'\-]*$"
    ).unwrap();

    // Structural cue: one alphabetic word
    pub static ref SINGLE_WORD_LINE: Regex = Regex::new(
        r"^[A-Za-z]+$"
    ).unwrap();
}

/// Split normalized text into `(byte offset, line)` pairs.
pub fn lines_with_offsets(text: &str) -> Vec<(usize, &str)> {
    let mut offset = 0;
    text.split('\n')
        .map(|line| {
            let start = offset;
            offset += line.len() + 1;
            (start, line)
        })
        .collect()
}
