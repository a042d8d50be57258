//! Ordered rule collection indexed by phase.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::phase::Phase;
use crate::engine::rule::Rule;
use crate::error::{Error, Result};

/// An ordered collection of head rules, immutable once shared.
///
/// Rules keep their declaration order; a per-phase index avoids scanning the
/// whole set on every phase. Markers record declaration positions for
/// `skipAfter`.
#[derive(Debug, Default)]
pub struct Ruleset {
    rules: Vec<Arc<Rule>>,
    by_phase: [Vec<usize>; 5],
    markers: HashMap<String, usize>,
}

impl Ruleset {
    /// Create an empty ruleset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule, rejecting duplicate non-zero ids.
    pub fn add(&mut self, rule: Rule) -> Result<()> {
        if rule.id != 0 && self.rules.iter().any(|r| r.id == rule.id) {
            return Err(Error::DuplicateRuleId { id: rule.id });
        }
        let position = self.rules.len();
        self.by_phase[rule.phase.index()].push(position);
        self.rules.push(Arc::new(rule));
        Ok(())
    }

    /// Record a `skipAfter` marker at the current declaration position.
    pub fn add_marker(&mut self, name: impl Into<String>) {
        self.markers.insert(name.into(), self.rules.len());
    }

    /// Declaration position of a marker.
    pub fn marker(&self, name: &str) -> Option<usize> {
        self.markers.get(name).copied()
    }

    /// Rules of a phase with their declaration positions, in order.
    pub fn phase_rules(&self, phase: Phase) -> Vec<(usize, Arc<Rule>)> {
        self.by_phase[phase.index()]
            .iter()
            .map(|&i| (i, Arc::clone(&self.rules[i])))
            .collect()
    }

    /// All rules in declaration order.
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    /// Number of head rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the ruleset holds no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: u64, phase: u8) -> Rule {
        Rule::builder()
            .action("id", &id.to_string())
            .action("phase", &phase.to_string())
            .build()
            .unwrap()
    }

    #[test]
    fn test_phase_index_keeps_order() {
        let mut rs = Ruleset::new();
        rs.add(rule(1, 1)).unwrap();
        rs.add(rule(2, 2)).unwrap();
        rs.add(rule(3, 1)).unwrap();

        let phase1: Vec<u64> = rs
            .phase_rules(Phase::RequestHeaders)
            .iter()
            .map(|(_, r)| r.id)
            .collect();
        assert_eq!(phase1, vec![1, 3]);
        assert_eq!(rs.phase_rules(Phase::RequestBody).len(), 1);
        assert_eq!(rs.len(), 3);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut rs = Ruleset::new();
        rs.add(rule(7, 1)).unwrap();
        assert!(matches!(
            rs.add(rule(7, 2)),
            Err(Error::DuplicateRuleId { id: 7 })
        ));
    }

    #[test]
    fn test_markers_record_positions() {
        let mut rs = Ruleset::new();
        rs.add(rule(1, 1)).unwrap();
        rs.add_marker("END_CHECKS");
        rs.add(rule(2, 1)).unwrap();
        assert_eq!(rs.marker("END_CHECKS"), Some(1));
        assert_eq!(rs.marker("MISSING"), None);
    }
}
