//! Rule catalogs: marker definitions, format profiles, exclusion lists and
//! date patterns, loaded once into an immutable [`RuleStore`].

mod catalog;
mod embedded;
mod store;

pub use catalog::{
    DateOrder, DatePattern, DateSpec, ExclusionSpec, FormatProfile, MarkerDefinition, MarkerKind,
    OutOfRangePolicy, RuleCatalog, SignalSet, StatusPrefix, Templates,
};
pub use embedded::DEFAULT_CATALOG;
pub use store::{CompiledDatePattern, CompiledProfile, Exclusions, Resolution, RuleStore};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a format profile, or the `unknown` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatId(String);

impl FormatId {
    /// Reserved id for text no profile claims.
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FormatId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Case- and punctuation-insensitive lookup key.
///
/// `"LDL-C (NIH Calc)"` and `"ldl c nih calc"` share the key `ldl c nih calc`.
pub fn normalize_key(s: &str) -> String {
    let mapped: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}
