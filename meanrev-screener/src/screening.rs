//! Composite screening rule engine.
//!
//! Rules are data, not code: the engine walks an ordered set of named
//! boolean predicates over each snapshot and keeps snapshots matching at
//! least one. New rules slot in without touching the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

use crate::snapshot::ValuationSnapshot;

/// A named boolean predicate over a snapshot.
pub struct ScreeningRule {
    /// Stable rule identifier carried into results and exports
    pub id: String,
    /// Human-readable description of what the rule selects
    pub description: String,
    /// The predicate itself
    pub predicate: Box<dyn Fn(&ValuationSnapshot) -> bool + Send + Sync>,
}

impl ScreeningRule {
    /// Create a rule from a closure.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        predicate: impl Fn(&ValuationSnapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl std::fmt::Debug for ScreeningRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreeningRule")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A snapshot that matched at least one rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningResult {
    /// The matched snapshot, read-only
    pub snapshot: ValuationSnapshot,
    /// Identifiers of every rule the snapshot matched
    pub rule_flags: BTreeSet<String>,
}

impl ScreeningResult {
    /// Whether a specific rule flagged this snapshot.
    pub fn matches(&self, rule_id: &str) -> bool {
        self.rule_flags.contains(rule_id)
    }
}

/// The screening engine.
pub struct ScreeningEngine {
    rules: Vec<ScreeningRule>,
}

impl ScreeningEngine {
    /// Create an engine over an arbitrary rule set.
    pub fn new(rules: Vec<ScreeningRule>) -> Self {
        Self { rules }
    }

    /// Create an engine with the reference rule set.
    pub fn with_reference_rules() -> Self {
        Self::new(reference_rules())
    }

    /// The rules this engine evaluates, in order.
    pub fn rules(&self) -> &[ScreeningRule] {
        &self.rules
    }

    /// Evaluate every rule against every snapshot, keeping snapshots
    /// that match at least one. Input order is preserved.
    pub fn screen(&self, snapshots: &[ValuationSnapshot]) -> Vec<ScreeningResult> {
        let mut results = Vec::new();

        for snapshot in snapshots {
            let rule_flags: BTreeSet<String> = self
                .rules
                .iter()
                .filter(|rule| (rule.predicate)(snapshot))
                .map(|rule| rule.id.clone())
                .collect();

            if !rule_flags.is_empty() {
                results.push(ScreeningResult {
                    snapshot: snapshot.clone(),
                    rule_flags,
                });
            }
        }

        info!(
            scanned = snapshots.len(),
            flagged = results.len(),
            rules = self.rules.len(),
            "Screening complete"
        );

        results
    }
}

/// The reference rule set.
///
/// Thresholds compare the stored percentage fields, so the `-10`
/// sentinels (scaled to -1000 in percent fields) auto-reject.
pub fn reference_rules() -> Vec<ScreeningRule> {
    vec![
        ScreeningRule::new(
            "rule_1",
            "5y PE reversion return > 30%, PEG < 1.5, growth > 10%, 5y PB reversion > 10%",
            |s| {
                s.predict_return_5y_pct > 30.0
                    && s.peg < 1.5
                    && s.growth_rate_pct > 10.0
                    && s.predict_pb_return_5y_pct > 10.0
            },
        ),
        ScreeningRule::new(
            "rule_2",
            "10y PE reversion return > 30%, PEG < 1.5, growth > 10%, 10y PB reversion > 10%",
            |s| {
                s.predict_return_10y_pct > 30.0
                    && s.peg < 1.5
                    && s.growth_rate_pct > 10.0
                    && s.predict_pb_return_10y_pct > 10.0
            },
        ),
        ScreeningRule::new(
            "rule_3",
            "PEG < 1.5, growth > 10%, 5y and 10y PE reversion > 30%, 5y PB reversion > 10%",
            |s| {
                s.peg < 1.5
                    && s.growth_rate_pct > 10.0
                    && s.predict_return_5y_pct > 30.0
                    && s.predict_return_10y_pct > 30.0
                    && s.predict_pb_return_5y_pct > 10.0
            },
        ),
    ]
}

// ============================================================================
// Tests
// ============================================================================
