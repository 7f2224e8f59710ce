use crate::candidate::Candidate;
use context_chain::UnitSpan;
use std::collections::{BTreeMap, BTreeSet};

/// Round-scoped record of which candidate (by priority position) holds each unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipMap {
    owners: BTreeMap<usize, usize>,
}

impl OwnershipMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map of the selected windows of `candidates`, keyed by their positions
    #[must_use]
    pub fn from_candidates(candidates: &[Candidate]) -> Self {
        let mut map = Self::new();
        for (position, candidate) in candidates.iter().enumerate() {
            map.claim(candidate.span(), position);
        }
        map
    }

    #[must_use]
    pub fn owner(&self, unit: usize) -> Option<usize> {
        self.owners.get(&unit).copied()
    }

    #[must_use]
    pub fn is_claimed(&self, unit: usize) -> bool {
        self.owners.contains_key(&unit)
    }

    /// Assign every unit of `span` to `position`, overwriting previous owners
    pub fn claim(&mut self, span: UnitSpan, position: usize) {
        for unit in span.indices() {
            self.owners.insert(unit, position);
        }
    }

    /// Drop every unit held by `position`
    pub fn release(&mut self, position: usize) {
        self.owners.retain(|_, owner| *owner != position);
    }

    /// Units of `span` held by someone other than `position`, grouped by owner
    #[must_use]
    pub fn conflicts(&self, span: UnitSpan, position: usize) -> BTreeMap<usize, Vec<usize>> {
        let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (&unit, &owner) in self.owners.range(span.first..=span.last) {
            if owner != position {
                grouped.entry(owner).or_default().push(unit);
            }
        }
        grouped
    }

    /// Every claimed unit index
    #[must_use]
    pub fn units(&self) -> BTreeSet<usize> {
        self.owners.keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
