//! Compiled, immutable view of a rule catalog.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use regex::Regex;
use tracing::debug;

use super::catalog::{
    DateOrder, DateSpec, FormatProfile, MarkerDefinition, MarkerKind, RuleCatalog,
};
use super::embedded::DEFAULT_CATALOG;
use super::{normalize_key, FormatId};
use crate::error::RuleError;
use crate::models::{AbnormalFlag, StrategyKind};

/// How a label was matched to a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Label equals the canonical name.
    Exact,
    /// Label equals the canonical name ignoring case and punctuation.
    Normalized,
    /// Label equals one of the aliases ignoring case and punctuation.
    Alias,
    /// Label matched one of the marker's regular expressions.
    Pattern,
}

/// Format profile with its regular expressions compiled.
#[derive(Debug)]
pub struct CompiledProfile {
    profile: FormatProfile,
    required: Vec<String>,
    any_of: Vec<String>,
    forbidden: Vec<String>,
    signal_patterns: Vec<Regex>,
    labeled_pair: Vec<Regex>,
    table_row: Vec<Regex>,
    status_prefixes: Vec<(String, Option<AbnormalFlag>)>,
}

impl CompiledProfile {
    fn compile(profile: FormatProfile) -> Result<Self, RuleError> {
        let id = profile.id.to_string();
        let lower = |items: &[String]| items.iter().map(|s| s.to_lowercase()).collect::<Vec<_>>();

        let signal_patterns = compile_all(&profile.signals.patterns, || format!("format '{}' signals", id))?;
        let labeled_pair = compile_templates(&profile, StrategyKind::LabeledPair)?;
        let table_row = compile_templates(&profile, StrategyKind::TableRow)?;

        Ok(Self {
            required: lower(&profile.signals.required),
            any_of: lower(&profile.signals.any_of),
            forbidden: lower(&profile.signals.forbidden),
            signal_patterns,
            labeled_pair,
            table_row,
            status_prefixes: profile
                .status_prefixes
                .iter()
                .map(|p| (p.text.trim().to_lowercase(), p.flag))
                .filter(|(text, _)| !text.is_empty())
                .collect(),
            profile,
        })
    }

    pub fn id(&self) -> &FormatId {
        &self.profile.id
    }

    pub fn profile(&self) -> &FormatProfile {
        &self.profile
    }

    /// Required substrings, lowercased.
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Alternative substrings, lowercased.
    pub fn any_of(&self) -> &[String] {
        &self.any_of
    }

    /// Forbidden substrings, lowercased.
    pub fn forbidden(&self) -> &[String] {
        &self.forbidden
    }

    pub fn signal_patterns(&self) -> &[Regex] {
        &self.signal_patterns
    }

    pub fn templates(&self, strategy: StrategyKind) -> &[Regex] {
        match strategy {
            StrategyKind::LabeledPair => &self.labeled_pair,
            StrategyKind::TableRow => &self.table_row,
            StrategyKind::FragmentedAdjacency => &[],
        }
    }

    pub fn strategies(&self) -> &[StrategyKind] {
        &self.profile.strategies
    }

    pub fn specificity(&self) -> usize {
        self.profile.signals.specificity()
    }

    /// Strip a leading status word, returning the rest of the line and the
    /// status flag. `None` when the line starts with no status word.
    pub fn strip_status<'t>(&self, line: &'t str) -> Option<(&'t str, Option<AbnormalFlag>)> {
        self.status_prefixes.iter().find_map(|(prefix, flag)| {
            let head = line.get(..prefix.len())?;
            let rest = &line[prefix.len()..];
            let at_boundary = rest.is_empty() || rest.starts_with(char::is_whitespace);
            (head.eq_ignore_ascii_case(prefix) && at_boundary).then(|| (rest.trim_start(), *flag))
        })
    }
}

fn compile_templates(profile: &FormatProfile, strategy: StrategyKind) -> Result<Vec<Regex>, RuleError> {
    let sources = profile.templates.for_strategy(strategy);
    if profile.strategies.contains(&strategy) && sources.is_empty() {
        return Err(RuleError::MissingTemplates {
            format: profile.id.to_string(),
            strategy: strategy.to_string(),
        });
    }

    let compiled = compile_all(sources, || format!("format '{}' {} template", profile.id, strategy))?;
    for regex in &compiled {
        for group in ["marker", "value"] {
            if !regex.capture_names().flatten().any(|name| name == group) {
                return Err(RuleError::MissingGroup {
                    format: profile.id.to_string(),
                    group: group.to_string(),
                });
            }
        }
    }
    Ok(compiled)
}

fn compile_all(sources: &[String], context: impl Fn() -> String) -> Result<Vec<Regex>, RuleError> {
    sources
        .iter()
        .map(|source| {
            Regex::new(source).map_err(|e| RuleError::Pattern {
                context: context(),
                source: e,
            })
        })
        .collect()
}

/// Compiled noise filters.
#[derive(Debug, Default)]
pub struct Exclusions {
    line_keywords: Vec<String>,
    label_words: Vec<String>,
    noise_patterns: Vec<Regex>,
    unit_tokens: HashSet<String>,
}

impl Exclusions {
    /// Line contains an excluded keyword.
    pub fn is_excluded_line(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.line_keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    /// Line is page furniture removed during normalization.
    pub fn is_noise(&self, line: &str) -> bool {
        self.noise_patterns.iter().any(|re| re.is_match(line))
    }

    /// Label contains an excluded whole word or phrase.
    pub fn has_excluded_word(&self, label: &str) -> bool {
        let padded = format!(" {} ", normalize_key(label));
        self.label_words
            .iter()
            .any(|word| padded.contains(&format!(" {} ", word)))
    }

    /// Line is nothing but a unit.
    pub fn is_unit(&self, line: &str) -> bool {
        self.unit_tokens.contains(&line.trim().to_lowercase())
    }
}

/// Date pattern with its regular expression compiled.
#[derive(Debug)]
pub struct CompiledDatePattern {
    pub regex: Regex,
    pub order: DateOrder,
}

/// Immutable rule catalog shared by every pipeline stage.
///
/// Built once at startup and passed around behind an `Arc`; nothing in it
/// changes after construction.
#[derive(Debug)]
pub struct RuleStore {
    catalog: RuleCatalog,
    by_name: HashMap<String, usize>,
    name_keys: HashMap<String, usize>,
    alias_keys: HashMap<String, usize>,
    marker_patterns: Vec<(Regex, usize)>,
    profiles: Vec<CompiledProfile>,
    exclusions: Exclusions,
    date_patterns: Vec<CompiledDatePattern>,
}

impl RuleStore {
    /// Build from the catalog embedded in the library.
    pub fn embedded() -> Result<Self, RuleError> {
        Self::from_json(DEFAULT_CATALOG)
    }

    /// Build from a catalog JSON file.
    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Build from catalog JSON text.
    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let catalog: RuleCatalog = serde_json::from_str(json)?;
        Self::from_catalog(catalog)
    }

    /// Validate and compile a catalog.
    pub fn from_catalog(catalog: RuleCatalog) -> Result<Self, RuleError> {
        let mut by_name = HashMap::new();
        let mut name_keys = HashMap::new();
        let mut alias_keys = HashMap::new();
        let mut claimed: HashMap<String, usize> = HashMap::new();
        let mut marker_patterns = Vec::new();

        for (idx, marker) in catalog.markers.iter().enumerate() {
            validate_marker(marker)?;
            if by_name.insert(marker.name.clone(), idx).is_some() {
                return Err(RuleError::DuplicateMarker(marker.name.clone()));
            }

            let name_key = normalize_key(&marker.name);
            claim(&mut claimed, &catalog.markers, &name_key, idx)?;
            name_keys.insert(name_key, idx);

            for alias in &marker.aliases {
                let key = normalize_key(alias);
                if key.is_empty() {
                    continue;
                }
                claim(&mut claimed, &catalog.markers, &key, idx)?;
                alias_keys.insert(key, idx);
            }

            for regex in compile_all(&marker.patterns, || format!("marker '{}'", marker.name))? {
                marker_patterns.push((regex, idx));
            }
        }

        let mut seen_ids = HashSet::new();
        let mut profiles = Vec::with_capacity(catalog.formats.len());
        for profile in &catalog.formats {
            if profile.id.is_unknown() || profile.id.as_str().is_empty() || !seen_ids.insert(profile.id.clone()) {
                return Err(RuleError::InvalidFormatId(profile.id.to_string()));
            }
            profiles.push(CompiledProfile::compile(profile.clone())?);
        }

        let spec = &catalog.exclusions;
        let exclusions = Exclusions {
            line_keywords: spec.line_keywords.iter().map(|s| s.to_lowercase()).collect(),
            label_words: spec
                .label_words
                .iter()
                .map(|s| normalize_key(s))
                .filter(|s| !s.is_empty())
                .collect(),
            noise_patterns: compile_all(&spec.noise_patterns, || "exclusions".to_string())?,
            unit_tokens: spec.unit_tokens.iter().map(|s| s.trim().to_lowercase()).collect(),
        };

        let date_patterns = catalog
            .dates
            .patterns
            .iter()
            .map(|p| {
                Regex::new(&p.regex)
                    .map(|regex| CompiledDatePattern { regex, order: p.order })
                    .map_err(|e| RuleError::Pattern {
                        context: "dates".to_string(),
                        source: e,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            markers = catalog.markers.len(),
            formats = profiles.len(),
            "rule store compiled"
        );

        Ok(Self {
            catalog,
            by_name,
            name_keys,
            alias_keys,
            marker_patterns,
            profiles,
            exclusions,
            date_patterns,
        })
    }

    /// Look up a marker by canonical name.
    pub fn marker(&self, name: &str) -> Option<&MarkerDefinition> {
        self.by_name.get(name).map(|&idx| &self.catalog.markers[idx])
    }

    pub fn markers(&self) -> &[MarkerDefinition] {
        &self.catalog.markers
    }

    /// Look up a format profile by id.
    pub fn profile(&self, id: &FormatId) -> Option<&CompiledProfile> {
        self.profiles.iter().find(|p| p.id() == id)
    }

    /// Format profiles in declared priority order.
    pub fn profiles(&self) -> &[CompiledProfile] {
        &self.profiles
    }

    pub fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    pub fn date_patterns(&self) -> &[CompiledDatePattern] {
        &self.date_patterns
    }

    pub fn dates(&self) -> &DateSpec {
        &self.catalog.dates
    }

    /// Resolve a printed label to a catalog marker.
    ///
    /// Tries the canonical name verbatim, then the normalized canonical
    /// name, then normalized aliases, then marker patterns in declared order.
    pub fn resolve(&self, label: &str) -> Option<(&MarkerDefinition, Resolution)> {
        let label = label.trim();
        if let Some(&idx) = self.by_name.get(label) {
            return Some((&self.catalog.markers[idx], Resolution::Exact));
        }

        let key = normalize_key(label);
        if key.is_empty() {
            return None;
        }
        if let Some(&idx) = self.name_keys.get(&key) {
            return Some((&self.catalog.markers[idx], Resolution::Normalized));
        }
        if let Some(&idx) = self.alias_keys.get(&key) {
            return Some((&self.catalog.markers[idx], Resolution::Alias));
        }

        self.marker_patterns
            .iter()
            .find(|(re, _)| re.is_match(label))
            .map(|&(_, idx)| (&self.catalog.markers[idx], Resolution::Pattern))
    }
}

fn validate_marker(marker: &MarkerDefinition) -> Result<(), RuleError> {
    if let (Some(min), Some(max)) = (marker.min, marker.max) {
        if min > max {
            return Err(RuleError::InvertedRange(marker.name.clone()));
        }
    }
    if marker.kind == MarkerKind::Categorical && marker.allowed.is_empty() {
        return Err(RuleError::EmptyCategories(marker.name.clone()));
    }
    Ok(())
}

fn claim(
    claimed: &mut HashMap<String, usize>,
    markers: &[MarkerDefinition],
    key: &str,
    idx: usize,
) -> Result<(), RuleError> {
    match claimed.get(key) {
        Some(&owner) if owner != idx => Err(RuleError::AliasCollision {
            alias: key.to_string(),
            first: markers[owner].name.clone(),
            second: markers[idx].name.clone(),
        }),
        Some(_) => Ok(()),
        None => {
            claimed.insert(key.to_string(), idx);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "markers": [
            {"name": "LDL-C", "aliases": ["LDL Cholesterol", "LDL Chol Calc (NIH)"], "min": 0, "max": 400},
            {"name": "HDL-C", "aliases": ["HDL Cholesterol"], "patterns": ["(?i)^hdl\\b"]},
            {"name": "ldl c direct"}
        ],
        "formats": [
            {"id": "plain", "strategies": ["labeled_pair"],
             "templates": {"labeled_pair": ["^(?P<marker>[A-Za-z ]+):\\s*(?P<value>\\S+)$"]}}
        ],
        "exclusions": {"line_keywords": ["Disclaimer"], "label_words": ["patient"], "unit_tokens": ["mg/dL"]}
    }"#;

    #[test]
    fn test_resolution_order() {
        let store = RuleStore::from_json(CATALOG).unwrap();

        let (m, how) = store.resolve("LDL-C").unwrap();
        assert_eq!((m.name.as_str(), how), ("LDL-C", Resolution::Exact));

        let (m, how) = store.resolve("ldl c").unwrap();
        assert_eq!((m.name.as_str(), how), ("LDL-C", Resolution::Normalized));

        let (m, how) = store.resolve("LDL CHOLESTEROL").unwrap();
        assert_eq!((m.name.as_str(), how), ("LDL-C", Resolution::Alias));

        let (m, how) = store.resolve("HDL Particle Count").unwrap();
        assert_eq!((m.name.as_str(), how), ("HDL-C", Resolution::Pattern));

        assert!(store.resolve("Glucose").is_none());
        assert!(store.resolve(" -- ").is_none());
    }

    #[test]
    fn test_lowercase_canonical_name_resolves_exactly() {
        let store = RuleStore::from_json(CATALOG).unwrap();
        let (m, how) = store.resolve("ldl c direct").unwrap();
        assert_eq!(m.name, "ldl c direct");
        assert_eq!(how, Resolution::Exact);
    }

    #[test]
    fn test_rejects_inverted_range() {
        let json = r#"{"markers": [{"name": "Glucose", "min": 200, "max": 50}], "formats": []}"#;
        assert!(matches!(RuleStore::from_json(json), Err(RuleError::InvertedRange(name)) if name == "Glucose"));
    }

    #[test]
    fn test_rejects_duplicates_and_collisions() {
        let dup = r#"{"markers": [{"name": "WBC"}, {"name": "WBC"}], "formats": []}"#;
        assert!(matches!(RuleStore::from_json(dup), Err(RuleError::DuplicateMarker(_))));

        let collision = r#"{"markers": [{"name": "WBC", "aliases": ["white cells"]},
                                        {"name": "White Cells"}], "formats": []}"#;
        assert!(matches!(RuleStore::from_json(collision), Err(RuleError::AliasCollision { .. })));
    }

    #[test]
    fn test_rejects_bad_profiles() {
        let reserved = r#"{"markers": [], "formats": [{"id": "unknown", "strategies": []}]}"#;
        assert!(matches!(RuleStore::from_json(reserved), Err(RuleError::InvalidFormatId(_))));

        let no_templates = r#"{"markers": [], "formats": [{"id": "x", "strategies": ["table_row"]}]}"#;
        assert!(matches!(RuleStore::from_json(no_templates), Err(RuleError::MissingTemplates { .. })));

        let no_group = r#"{"markers": [], "formats": [{"id": "x", "strategies": ["table_row"],
                          "templates": {"table_row": ["^(?P<marker>\\w+) (\\d+)$"]}}]}"#;
        assert!(matches!(
            RuleStore::from_json(no_group),
            Err(RuleError::MissingGroup { group, .. }) if group == "value"
        ));

        let bad_regex = r#"{"markers": [], "formats": [{"id": "x", "strategies": [],
                           "signals": {"patterns": ["(unclosed"]}}]}"#;
        assert!(matches!(RuleStore::from_json(bad_regex), Err(RuleError::Pattern { .. })));
    }

    #[test]
    fn test_strip_status() {
        let json = r#"{"markers": [], "formats": [{"id": "dash", "strategies": ["fragmented_adjacency"],
                       "status_prefixes": [{"text": "In Range"}, {"text": " Above Range ", "flag": "high"}, {"text": ""}]}]}"#;
        let store = RuleStore::from_json(json).unwrap();
        let profile = store.profile(&FormatId::new("dash")).unwrap();

        assert_eq!(profile.strip_status("In Range 14.3 g/dL"), Some(("14.3 g/dL", None)));
        assert_eq!(
            profile.strip_status("ABOVE RANGE 412"),
            Some(("412", Some(AbnormalFlag::High)))
        );
        assert_eq!(profile.strip_status("In Ranges 5"), None);
        assert_eq!(profile.strip_status("14.3"), None);
        assert_eq!(profile.strip_status("In Range"), Some(("", None)));
    }

    #[test]
    fn test_exclusions() {
        let store = RuleStore::from_json(CATALOG).unwrap();
        let ex = store.exclusions();
        assert!(ex.is_excluded_line("DISCLAIMER: for research use"));
        assert!(ex.has_excluded_word("Patient Name"));
        assert!(!ex.has_excluded_word("Outpatient Glucose"));
        assert!(ex.is_unit(" mg/dl "));
    }

    #[test]
    fn test_embedded_catalog_compiles() {
        let store = RuleStore::embedded().unwrap();
        assert!(!store.markers().is_empty());
        let ids: Vec<&str> = store.profiles().iter().map(|p| p.id().as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "labcorp_nmr",
                "labcorp_standard",
                "quest_analyte_value",
                "cleveland_heartlab",
                "elation_labcorp",
                "boston_heart",
                "function_health",
                "fragmented",
                "standard"
            ]
        );
        assert!(store.marker("Glucose").is_some());
        assert!(!store.date_patterns().is_empty());
    }
}
