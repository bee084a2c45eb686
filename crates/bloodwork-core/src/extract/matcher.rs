//! Runs a profile's strategies and merges their candidates.

use std::collections::HashSet;

use tracing::{debug, trace};

use super::strategies::{FragmentedStrategy, MatchContext, Strategy, TemplateStrategy};
use super::Candidate;
use crate::models::{ExtractionConfig, StrategyKind};
use crate::rules::{CompiledProfile, RuleStore};

/// Candidates of one document plus what produced them.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Candidates ordered by source offset.
    pub candidates: Vec<Candidate>,
    /// Strategies that ran, in order.
    pub strategies_run: Vec<StrategyKind>,
    /// Whether the fragmented fallback ran.
    pub fallback_used: bool,
}

/// Applies a format profile's strategies to normalized text.
///
/// Every strategy runs in declared order and contributes candidates, except
/// the fragmented fallback which runs only while the candidates found so far
/// stay below the fallback threshold.
pub struct PatternMatcher<'a> {
    rules: &'a RuleStore,
    config: &'a ExtractionConfig,
}

impl<'a> PatternMatcher<'a> {
    pub fn new(rules: &'a RuleStore, config: &'a ExtractionConfig) -> Self {
        Self { rules, config }
    }

    /// Collect candidates. Without a profile nothing is matched.
    pub fn run(&self, text: &str, profile: Option<&CompiledProfile>) -> MatchOutcome {
        let Some(profile) = profile else {
            return MatchOutcome::default();
        };

        let ctx = MatchContext::new(text, profile, self.rules, self.config);
        let threshold = profile
            .profile()
            .fallback_threshold
            .unwrap_or(self.config.fallback_min_candidates);

        let mut outcome = MatchOutcome::default();
        for &kind in profile.strategies() {
            if kind == StrategyKind::FragmentedAdjacency {
                let usable = self.usable_count(&outcome.candidates);
                if usable >= threshold {
                    debug!(usable, threshold, "skipping fragmented fallback");
                    continue;
                }
                outcome.fallback_used = true;
            }

            let found = strategy_for(kind).collect(&ctx);
            debug!(strategy = %kind, found = found.len(), "strategy finished");
            for candidate in &found {
                trace!(
                    label = %candidate.label,
                    value = %candidate.raw_value,
                    offset = candidate.offset,
                    "candidate"
                );
            }

            outcome.candidates.extend(found);
            outcome.strategies_run.push(kind);
        }

        // stable: equal offsets keep strategy order
        outcome.candidates.sort_by_key(|c| c.offset);
        outcome
    }

    /// Distinct markers the candidates so far could yield. Table rows with
    /// unknown labels do not count.
    fn usable_count(&self, candidates: &[Candidate]) -> usize {
        if self.config.accept_unlisted_markers {
            return candidates.len();
        }
        candidates
            .iter()
            .filter_map(|c| self.rules.resolve(&c.label))
            .map(|(marker, _)| marker.name.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

fn strategy_for(kind: StrategyKind) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::LabeledPair => Box::new(TemplateStrategy::labeled_pair()),
        StrategyKind::TableRow => Box::new(TemplateStrategy::table_row()),
        StrategyKind::FragmentedAdjacency => Box::new(FragmentedStrategy),
    }
}
