use context_chain::UnitSpan;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side(s) a growth operation extends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Growth {
    Left,
    Right,
    Bidirectional,
}

impl Growth {
    #[must_use]
    pub const fn action(self, n: usize) -> GrowthAction {
        match self {
            Self::Left => GrowthAction::Left(n),
            Self::Right => GrowthAction::Right(n),
            Self::Bidirectional => GrowthAction::Bidirectional(n),
        }
    }
}

/// Operation recorded in a state's action trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthAction {
    /// Grew by up to n units on the left
    Left(usize),
    /// Grew by up to n units on the right
    Right(usize),
    /// Grew by up to n units on both sides
    Bidirectional(usize),
    /// Absorbed a neighbouring window during a merge pass
    Merge,
}

impl fmt::Display for GrowthAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left(n) => write!(f, "left {n}"),
            Self::Right(n) => write!(f, "right {n}"),
            Self::Bidirectional(n) => write!(f, "bidirectional {n}"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// Immutable snapshot of one context window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    span: UnitSpan,
    score: f32,
    actions: Vec<GrowthAction>,
    round: usize,
    improvement_density: f32,
}

impl State {
    /// The single-unit window a candidate starts from
    #[must_use]
    pub fn seed(anchor: usize, score: f32) -> Self {
        Self {
            span: UnitSpan::single(anchor),
            score,
            actions: Vec::new(),
            round: 0,
            improvement_density: 0.0,
        }
    }

    /// A child window reached from `self` by `action`
    pub(crate) fn derive(
        &self,
        action: GrowthAction,
        span: UnitSpan,
        score: f32,
        round: usize,
        improvement_density: f32,
    ) -> Self {
        let mut actions = self.actions.clone();
        actions.push(action);
        Self {
            span,
            score,
            actions,
            round,
            improvement_density,
        }
    }

    /// Same window, stamped for `round` with `baseline` as its density
    pub(crate) fn restamped(self, round: usize, baseline: f32) -> Self {
        Self {
            round,
            improvement_density: baseline,
            ..self
        }
    }

    pub(crate) fn set_score(&mut self, score: f32) {
        self.score = score;
    }

    #[must_use]
    pub const fn span(&self) -> UnitSpan {
        self.span
    }

    #[must_use]
    pub const fn score(&self) -> f32 {
        self.score
    }

    #[must_use]
    pub fn actions(&self) -> &[GrowthAction] {
        &self.actions
    }

    #[must_use]
    pub fn last_action(&self) -> Option<GrowthAction> {
        self.actions.last().copied()
    }

    /// Round in which this state was created
    #[must_use]
    pub const fn round(&self) -> usize {
        self.round
    }

    /// Score gained per word of the window, relative to the parent state
    #[must_use]
    pub const fn improvement_density(&self) -> f32 {
        self.improvement_density
    }

    /// `first-last` identifier (zero-padded indices)
    #[must_use]
    pub fn id(&self) -> String {
        self.span.to_string()
    }
}

/// Round a density to three decimals so near-identical gains compare equal
#[must_use]
pub fn round_density(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_appends_action_and_keeps_parent() {
        let seed = State::seed(4, 1.5);
        let child = seed.derive(GrowthAction::Left(1), UnitSpan::new(3, 4), 2.0, 1, 0.25);

        assert!(seed.actions().is_empty());
        assert_eq!(child.actions(), &[GrowthAction::Left(1)]);
        assert_eq!(child.last_action(), Some(GrowthAction::Left(1)));
        assert_eq!(child.id(), "003-004");
        assert_eq!(seed.id(), "004");
    }

    #[test]
    fn action_labels() {
        assert_eq!(GrowthAction::Bidirectional(2).to_string(), "bidirectional 2");
        assert_eq!(Growth::Right.action(3).to_string(), "right 3");
        assert_eq!(GrowthAction::Merge.to_string(), "merge");
    }

    #[test]
    fn densities_round_to_three_decimals() {
        assert_eq!(round_density(0.123_456), 0.123);
        assert_eq!(round_density(-0.0004), 0.0);
    }
}
