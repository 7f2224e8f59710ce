use crate::error::{ExpansionError, Result};
use crate::oracle::{Evaluator, RelevanceOracle};
use crate::state::{round_density, Growth, GrowthAction, State};
use context_chain::{Direction, Document, UnitSpan};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Minimum improvement density a grown window needs to replace the current one
pub const DEFAULT_THRESHOLD: f32 = 0.01;

/// Which history entry is the candidate's current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Whatever state was appended last
    #[default]
    Latest,
    /// A fixed history index
    Explicit(usize),
}

/// Filters and tie-breaking for [`Candidate::optimize`]
#[derive(Debug, Clone, Copy)]
pub struct OptimizeOptions<'a> {
    /// Status-quo density: the current state wins unless something beats it
    pub threshold: f32,
    /// Only consider states created in this round
    pub round: Option<usize>,
    /// Skip states covering any of these unit indices
    pub forbidden: Option<&'a BTreeSet<usize>>,
    /// Skip these history indices
    pub excluded: &'a [usize],
    /// Freeze the candidate when the selection does not move
    pub stop_if_unchanged: bool,
}

impl Default for OptimizeOptions<'_> {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl<'a> OptimizeOptions<'a> {
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self {
            threshold,
            round: None,
            forbidden: None,
            excluded: &[],
            stop_if_unchanged: false,
        }
    }

    #[must_use]
    pub const fn in_round(mut self, round: usize) -> Self {
        self.round = Some(round);
        self
    }

    #[must_use]
    pub const fn forbidding(mut self, units: &'a BTreeSet<usize>) -> Self {
        self.forbidden = Some(units);
        self
    }

    #[must_use]
    pub const fn excluding(mut self, indices: &'a [usize]) -> Self {
        self.excluded = indices;
        self
    }

    #[must_use]
    pub const fn stop_if_unchanged(mut self) -> Self {
        self.stop_if_unchanged = true;
        self
    }

    fn admits(&self, index: usize, state: &State) -> bool {
        if self.round.is_some_and(|round| state.round() != round) {
            return false;
        }
        if self.excluded.contains(&index) {
            return false;
        }
        match self.forbidden {
            Some(units) => !state.span().indices().any(|u| units.contains(&u)),
            None => true,
        }
    }
}

/// A context window anchored at one unit, with every version it went through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    anchor: usize,
    history: Vec<State>,
    selection: Selection,
    expandable: bool,
}

impl Candidate {
    /// A fresh candidate holding only its anchor unit
    #[must_use]
    pub fn new(anchor: usize, score: f32) -> Self {
        Self {
            anchor,
            history: vec![State::seed(anchor, score)],
            selection: Selection::Latest,
            expandable: true,
        }
    }

    #[must_use]
    pub const fn anchor(&self) -> usize {
        self.anchor
    }

    #[must_use]
    pub fn history(&self) -> &[State] {
        &self.history
    }

    #[must_use]
    pub const fn selection(&self) -> Selection {
        self.selection
    }

    /// Concrete history index of the selected state
    #[must_use]
    pub fn selected_index(&self) -> usize {
        match self.selection {
            Selection::Latest => self.history.len() - 1,
            Selection::Explicit(index) => index,
        }
    }

    /// The selected state
    #[must_use]
    pub fn context(&self) -> &State {
        &self.history[self.selected_index()]
    }

    #[must_use]
    pub fn score(&self) -> f32 {
        self.context().score()
    }

    #[must_use]
    pub fn span(&self) -> UnitSpan {
        self.context().span()
    }

    #[must_use]
    pub const fn is_expandable(&self) -> bool {
        self.expandable
    }

    /// Permanently exclude this candidate from growth
    pub fn freeze(&mut self) {
        self.expandable = false;
    }

    /// Pin the selection to a history index
    pub fn select(&mut self, index: usize) -> Result<()> {
        if index >= self.history.len() {
            return Err(ExpansionError::StateNotFound(index));
        }
        self.selection = Selection::Explicit(index);
        Ok(())
    }

    /// Turn a `Latest` selection into the index it currently points at
    pub fn pin_selection(&mut self) -> usize {
        let index = self.selected_index();
        self.selection = Selection::Explicit(index);
        index
    }

    /// Text of the selected window, units separated by spaces
    pub fn text(&self, document: &Document) -> Result<String> {
        Ok(document.text(self.span(), " ")?)
    }

    /// Append a state grown from `branch_from` (default: the selected state)
    ///
    /// Returns the new history index, or `None` when nothing was attempted
    /// (`n == 0` or the candidate is frozen). Reaching a document boundary is not
    /// an error: the window simply grows by fewer units.
    pub fn expand<O: RelevanceOracle>(
        &mut self,
        growth: Growth,
        n: usize,
        branch_from: Option<usize>,
        round: usize,
        document: &Document,
        evaluator: &Evaluator<O>,
    ) -> Result<Option<usize>> {
        if n == 0 || !self.expandable {
            return Ok(None);
        }

        let parent_index = branch_from.unwrap_or_else(|| self.selected_index());
        let parent = self
            .history
            .get(parent_index)
            .ok_or(ExpansionError::StateNotFound(parent_index))?;

        let parent_span = parent.span();
        let span = match growth {
            Growth::Left => document.extend(parent_span, Direction::Left, n)?,
            Growth::Right => document.extend(parent_span, Direction::Right, n)?,
            Growth::Bidirectional => {
                let right = document.extend(parent_span, Direction::Right, n)?;
                document.extend(right, Direction::Left, n)?
            }
        };

        let score = evaluator.predict(document.slice(span)?)?;
        let words = document.word_count(span)?;
        let density = if words > 0 {
            round_density((score - parent.score()) / words as f32)
        } else {
            parent.improvement_density()
        };

        let state = parent.derive(growth.action(n), span, score, round, density);
        log::trace!(
            "candidate {}: {} -> {} ({}), score {:.3}, density {:.3}",
            self.anchor,
            parent.id(),
            state.id(),
            growth.action(n),
            score,
            density
        );
        self.history.push(state);
        Ok(Some(self.history.len() - 1))
    }

    /// Select the admissible state with the highest improvement density
    ///
    /// The currently selected state counts as having exactly `threshold`, so it stays
    /// selected unless another state strictly beats it; ties go to the earlier entry.
    /// Returns `None` and freezes the candidate when nothing is admissible, leaving the
    /// selection where it was.
    pub fn optimize(&mut self, options: &OptimizeOptions<'_>) -> Option<usize> {
        let current = self.selected_index();

        let mut best: Option<(usize, f32)> = None;
        for (index, state) in self.history.iter().enumerate() {
            if !options.admits(index, state) {
                continue;
            }
            let density = if index == current {
                options.threshold
            } else {
                state.improvement_density()
            };
            if best.map_or(true, |(_, top)| density > top) {
                best = Some((index, density));
            }
        }

        let Some((chosen, _)) = best else {
            self.expandable = false;
            return None;
        };

        if options.stop_if_unchanged && chosen == current {
            self.expandable = false;
        }
        self.selection = Selection::Explicit(chosen);
        Some(chosen)
    }

    /// Drop every state except the selected one and `exceptions`
    pub fn clear_history(&mut self, exceptions: &[usize]) {
        let selected = self.selected_index();
        let keep: BTreeSet<usize> = exceptions
            .iter()
            .copied()
            .filter(|&i| i < self.history.len())
            .chain(std::iter::once(selected))
            .collect();

        let mut index = 0;
        self.history.retain(|_| {
            let kept = keep.contains(&index);
            index += 1;
            kept
        });

        if let Selection::Explicit(_) = self.selection {
            let remapped = keep.range(..selected).count();
            self.selection = Selection::Explicit(remapped);
        }
    }

    /// Drop every state created in `round`
    ///
    /// Refused when the selected state belongs to that round.
    pub fn clear_round(&mut self, round: usize) -> Result<()> {
        if self.context().round() == round {
            return Err(ExpansionError::ClearSelectedRound { round });
        }

        let selected = self.selected_index();
        let removed_before = self.history[..selected]
            .iter()
            .filter(|s| s.round() == round)
            .count();
        self.history.retain(|s| s.round() != round);

        if let Selection::Explicit(index) = self.selection {
            self.selection = Selection::Explicit(index - removed_before);
        }
        Ok(())
    }

    /// Move the selected state to the end of the history, stamped for `round`
    ///
    /// The stamped copy carries `baseline` as its density so it acts as the status quo
    /// for this round's growth. Returns its index.
    pub(crate) fn restamp_selected(&mut self, round: usize, baseline: f32) -> usize {
        let selected = self.selected_index();
        let state = self.history.remove(selected).restamped(round, baseline);
        self.history.push(state);
        self.pin_selection_last()
    }

    /// Append a copy of the selected state widened to `span` and select it
    pub(crate) fn absorb(&mut self, span: UnitSpan) {
        let current = self.context();
        let merged = current.derive(
            GrowthAction::Merge,
            span,
            current.score(),
            current.round(),
            current.improvement_density(),
        );
        self.history.push(merged);
        self.pin_selection_last();
    }

    /// Overwrite the selected state's score after its window was edited
    pub(crate) fn rescore(&mut self, score: f32) {
        let index = self.selected_index();
        self.history[index].set_score(score);
    }

    fn pin_selection_last(&mut self) -> usize {
        let index = self.history.len() - 1;
        self.selection = Selection::Explicit(index);
        index
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let span = self.span();
        write!(
            f,
            "Candidate(range=[{}, {}], score={:.3})",
            span.first,
            span.last,
            self.score()
        )
    }
}
