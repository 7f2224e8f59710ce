//! Round-based arbitration between the candidates of one cluster
//!
//! Every round, candidates are visited in priority order. Each one grows by one step,
//! keeps the best grown window and then has to defend it against the units already
//! claimed this round. Higher-priority claims also push lower-priority candidates off the
//! units they held in the previous round. The run converges when no candidate can grow.

use crate::candidate::{Candidate, OptimizeOptions};
use crate::cluster::CandidateCluster;
use crate::config::{ArbitrationConfig, ExpansionConfig};
use crate::error::Result;
use crate::oracle::{Evaluator, RelevanceOracle};
use crate::ownership::OwnershipMap;
use crate::snapshot::RoundSnapshot;
use crate::state::{Growth, GrowthAction};
use context_chain::Document;
use std::collections::BTreeSet;

/// Terminal states of the per-candidate conflict loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Kept its window and may keep growing
    Resolved,
    /// Kept its window but will not grow again
    Frozen,
    /// Lost its window and leaves the cluster
    Evicted,
}

/// What one round left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Ownership of the surviving candidates, by their new positions
    pub ownership: OwnershipMap,
    /// Whether any candidate is still able to grow
    pub expanded: bool,
    pub evicted: usize,
}

/// Run one arbitration round over `cluster`
///
/// `previous` is the ownership map returned by the prior round, if any. Evicted
/// candidates are removed, duplicates dropped and the cluster reranked before returning.
pub fn run_round<O: RelevanceOracle>(
    cluster: &mut CandidateCluster,
    document: &Document,
    evaluator: &Evaluator<O>,
    round: usize,
    previous: Option<&OwnershipMap>,
    config: &ArbitrationConfig,
) -> Result<RoundOutcome> {
    let candidates = cluster.candidates_mut();
    let mut ownership = OwnershipMap::new();
    let mut evicted = vec![false; candidates.len()];
    let mut expanded = false;

    for position in 0..candidates.len() {
        if evicted[position] {
            continue;
        }

        let candidate = &mut candidates[position];
        if !candidate.is_expandable() {
            if !claim_frozen(candidate, position, &mut ownership, config.threshold) {
                log::debug!("round {round}: frozen {candidate} lost its units, evicted");
                evicted[position] = true;
            }
            continue;
        }

        if ownership.is_claimed(candidate.anchor()) {
            log::debug!("round {round}: anchor of {candidate} already claimed, evicted");
            evicted[position] = true;
            continue;
        }

        let start = grow(candidate, round, document, evaluator, config)?;
        let resolution = resolve_conflicts(
            candidates,
            position,
            start,
            round,
            config.threshold,
            &mut ownership,
            &mut evicted,
        )?;
        if resolution == Resolution::Evicted {
            log::debug!("round {round}: {} evicted", candidates[position]);
            evicted[position] = true;
            continue;
        }

        let candidate = &mut candidates[position];
        if round > 0 {
            candidate.clear_round(round - 1)?;
        }
        ownership.claim(candidate.span(), position);
        log::debug!("round {round}: #{position} holds {candidate} ({resolution:?})");
        expanded |= candidate.is_expandable();

        if let Some(previous) = previous {
            enforce_previous_claims(
                candidates,
                position,
                previous,
                &ownership,
                &mut evicted,
                config.threshold,
            );
        }
    }

    let evicted_count = evicted.iter().filter(|&&e| e).count();
    let mut index = 0;
    candidates.retain(|_| {
        let keep = !evicted[index];
        index += 1;
        keep
    });
    cluster.remove_duplicates().rerank();

    Ok(RoundOutcome {
        ownership: OwnershipMap::from_candidates(cluster.candidates()),
        expanded,
        evicted: evicted_count,
    })
}

/// Restamp the selected state for `round`, branch from it and keep the best child
///
/// Returns the history index of the round-start state.
fn grow<O: RelevanceOracle>(
    candidate: &mut Candidate,
    round: usize,
    document: &Document,
    evaluator: &Evaluator<O>,
    config: &ArbitrationConfig,
) -> Result<usize> {
    let start = candidate.restamp_selected(round, config.threshold);

    let growths: &[Growth] = match candidate.context().last_action() {
        None | Some(GrowthAction::Bidirectional(_) | GrowthAction::Merge) => {
            &[Growth::Left, Growth::Right, Growth::Bidirectional]
        }
        Some(GrowthAction::Left(_)) => &[Growth::Left],
        Some(GrowthAction::Right(_)) => &[Growth::Right],
    };
    for &growth in growths {
        candidate.expand(growth, config.step, Some(start), round, document, evaluator)?;
    }

    candidate.optimize(
        &OptimizeOptions::new(config.threshold)
            .in_round(round)
            .stop_if_unchanged(),
    );
    Ok(start)
}

/// Claim the window of a candidate that no longer grows
///
/// A contested window is swapped for the best earlier state that avoids every claimed
/// unit. Returns false when no such state exists.
fn claim_frozen(
    candidate: &mut Candidate,
    position: usize,
    ownership: &mut OwnershipMap,
    threshold: f32,
) -> bool {
    if !ownership.conflicts(candidate.span(), position).is_empty() {
        let claimed = ownership.units();
        let options = OptimizeOptions::new(threshold).forbidding(&claimed);
        if candidate.optimize(&options).is_none() {
            return false;
        }
    }
    ownership.claim(candidate.span(), position);
    true
}

/// Defend the selected window of `candidates[position]` against this round's claims
fn resolve_conflicts(
    candidates: &mut [Candidate],
    position: usize,
    start: usize,
    round: usize,
    threshold: f32,
    ownership: &mut OwnershipMap,
    evicted: &mut [bool],
) -> Result<Resolution> {
    let mut rejected: Vec<usize> = Vec::new();
    loop {
        let candidate = &candidates[position];
        let settled = if candidate.is_expandable() {
            Resolution::Resolved
        } else {
            Resolution::Frozen
        };

        let conflicts = ownership.conflicts(candidate.span(), position);
        if conflicts.is_empty() {
            return Ok(settled);
        }

        let score = candidate.score();
        if conflicts
            .keys()
            .all(|&owner| score > candidates[owner].score())
        {
            for (owner, units) in conflicts {
                log::debug!(
                    "round {round}: {} takes {units:?} from {}, which is evicted",
                    candidates[position],
                    candidates[owner]
                );
                evicted[owner] = true;
                ownership.release(owner);
            }
            return Ok(settled);
        }

        let candidate = &mut candidates[position];
        let selected = candidate.selected_index();
        if selected == start {
            return Ok(Resolution::Evicted);
        }

        if conflicts.len() == 1 {
            // Fall back to the next best window grown this round
            rejected.push(selected);
            candidate.select(start)?;
            let options = OptimizeOptions::new(threshold)
                .in_round(round)
                .excluding(&rejected);
            if candidate.optimize(&options).map_or(true, |chosen| chosen == start) {
                candidate.freeze();
            }
        } else {
            candidate.select(start)?;
            candidate.freeze();
        }
    }
}

/// Push lower-priority candidates off the units `candidates[position]` just claimed
fn enforce_previous_claims(
    candidates: &mut [Candidate],
    position: usize,
    previous: &OwnershipMap,
    ownership: &OwnershipMap,
    evicted: &mut [bool],
    threshold: f32,
) {
    let displaced: BTreeSet<usize> = candidates[position]
        .span()
        .indices()
        .filter_map(|unit| previous.owner(unit))
        .filter(|&owner| owner > position && owner < candidates.len() && !evicted[owner])
        .collect();
    if displaced.is_empty() {
        return;
    }

    let claimed = ownership.units();
    let options = OptimizeOptions::new(threshold).forbidding(&claimed);
    for owner in displaced {
        let rival = &mut candidates[owner];
        if rival.optimize(&options).is_none() {
            log::debug!("{rival} has no window left after #{position} claimed its units, evicted");
            evicted[owner] = true;
        }
    }
}

/// Round-by-round arbitration, one [`RoundSnapshot`] per round
///
/// The last snapshot yielded has `converged` set. An empty cluster yields nothing.
pub struct ContextExpansion<'a, O> {
    cluster: &'a mut CandidateCluster,
    document: &'a Document,
    evaluator: &'a Evaluator<O>,
    config: ArbitrationConfig,
    round: usize,
    round_limit: usize,
    previous: Option<OwnershipMap>,
    finished: bool,
}

impl<'a, O: RelevanceOracle> ContextExpansion<'a, O> {
    pub fn new(
        cluster: &'a mut CandidateCluster,
        document: &'a Document,
        evaluator: &'a Evaluator<O>,
        config: ArbitrationConfig,
    ) -> Self {
        let round_limit = (cluster.len() * document.len()).max(1);
        Self {
            cluster,
            document,
            evaluator,
            config,
            round: 0,
            round_limit,
            previous: None,
            finished: false,
        }
    }

    /// Number of rounds run so far
    #[must_use]
    pub const fn rounds(&self) -> usize {
        self.round
    }

    /// Ownership of the most recent round
    #[must_use]
    pub fn ownership(&self) -> Option<&OwnershipMap> {
        self.previous.as_ref()
    }

    fn step(&mut self) -> Result<RoundSnapshot> {
        let outcome = run_round(
            self.cluster,
            self.document,
            self.evaluator,
            self.round,
            self.previous.as_ref(),
            &self.config,
        )?;

        let mut converged = !outcome.expanded;
        if !converged && self.round + 1 >= self.round_limit {
            log::warn!(
                "cluster {}: stopping after {} rounds without convergence",
                self.cluster.id(),
                self.round_limit
            );
            for candidate in self.cluster.candidates_mut() {
                candidate.freeze();
            }
            converged = true;
        }

        if converged {
            for candidate in self.cluster.candidates_mut() {
                candidate.clear_history(&[]);
            }
            log::info!(
                "cluster {}: converged after {} rounds, {} candidates",
                self.cluster.id(),
                self.round + 1,
                self.cluster.len()
            );
        } else {
            log::info!(
                "cluster {}: round {} kept {} candidates ({} evicted)",
                self.cluster.id(),
                self.round,
                self.cluster.len(),
                outcome.evicted
            );
        }

        let snapshot = RoundSnapshot::capture(self.cluster, self.document, self.round, converged)?;
        self.previous = Some(outcome.ownership);
        self.round += 1;
        self.finished = converged;
        Ok(snapshot)
    }
}

impl<O: RelevanceOracle> Iterator for ContextExpansion<'_, O> {
    type Item = Result<RoundSnapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if self.round == 0 {
            if self.cluster.is_empty() {
                log::warn!("cluster {}: nothing to expand", self.cluster.id());
                self.finished = true;
                return None;
            }
            if let Err(err) = self.cluster.ensure_document(self.document) {
                self.finished = true;
                return Some(Err(err));
            }
        }

        let result = self.step();
        if result.is_err() {
            self.finished = true;
        }
        Some(result)
    }
}

/// Run arbitration to convergence and return the final snapshot
///
/// An empty cluster is left untouched and produces an empty converged snapshot.
pub fn expand_cluster<O: RelevanceOracle>(
    cluster: &mut CandidateCluster,
    document: &Document,
    evaluator: &Evaluator<O>,
    config: &ArbitrationConfig,
) -> Result<RoundSnapshot> {
    let mut last = None;
    for snapshot in ContextExpansion::new(cluster, document, evaluator, *config) {
        last = Some(snapshot?);
    }
    match last {
        Some(snapshot) => Ok(snapshot),
        None => RoundSnapshot::capture(cluster, document, 0, true),
    }
}

/// Evaluate, expand, filter and merge one cluster with the settings of `config`
pub fn refine_cluster<O: RelevanceOracle>(
    cluster: &mut CandidateCluster,
    document: &Document,
    evaluator: &Evaluator<O>,
    config: &ExpansionConfig,
) -> Result<RoundSnapshot> {
    cluster.evaluate(document, evaluator)?;
    let expanded = expand_cluster(cluster, document, evaluator, &config.arbitration)?;

    cluster
        .filter(config.filter_threshold)
        .merge(config.merge_threshold, document, evaluator)?;
    log::debug!(
        "cluster {}: {} candidates after filter and merge (from {})",
        cluster.id(),
        cluster.len(),
        expanded.len()
    );
    RoundSnapshot::capture(cluster, document, expanded.round, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_chain::{Unit, UnitSpan};
    use pretty_assertions::assert_eq;

    fn weighted(weights: &[f32]) -> (Document, Evaluator<impl Fn(&str, &[Unit]) -> f32>) {
        let document =
            Document::from_texts(0, (0..weights.len()).map(|i| format!("s{i} x "))).unwrap();
        let weights = weights.to_vec();
        let evaluator = Evaluator::new("q", move |_: &str, units: &[Unit]| -> f32 {
            units.iter().map(|u| weights[u.index]).sum()
        });
        (document, evaluator)
    }

    fn cluster_of(
        anchors: &[usize],
        document: &Document,
        evaluator: &Evaluator<impl RelevanceOracle>,
    ) -> CandidateCluster {
        let mut cluster = CandidateCluster::new(0, 0, anchors.to_vec(), 1.0);
        cluster.evaluate(document, evaluator).unwrap();
        cluster
    }

    #[test]
    fn first_round_grows_towards_gain() {
        let (doc, eval) = weighted(&[0.0, 0.0, 9.0, 1.0, 0.0]);
        let mut cluster = cluster_of(&[2], &doc, &eval);

        let outcome = run_round(&mut cluster, &doc, &eval, 0, None, &ArbitrationConfig::default())
            .unwrap();
        assert!(outcome.expanded);
        assert_eq!(cluster.candidates()[0].span(), UnitSpan::new(2, 3));
        assert_eq!(
            cluster.candidates()[0].context().last_action(),
            Some(GrowthAction::Right(1))
        );
        assert_eq!(outcome.ownership.owner(3), Some(0));
    }

    #[test]
    fn claimed_anchor_is_evicted() {
        let (doc, eval) = weighted(&[0.0, 5.0, 4.0, 0.0]);
        let mut cluster = cluster_of(&[1, 2], &doc, &eval);

        run_round(&mut cluster, &doc, &eval, 0, None, &ArbitrationConfig::default()).unwrap();
        assert_eq!(cluster.anchors(), vec![1]);
        assert_eq!(cluster.candidates()[0].span(), UnitSpan::new(1, 2));
    }

    #[test]
    fn weaker_candidate_falls_back_then_freezes() {
        // @1 grabs unit 2 first; @3 would like unit 2 as well and loses it
        let (doc, eval) = weighted(&[0.0, 9.0, 2.0, 3.0, 0.0]);
        let mut cluster = cluster_of(&[1, 3], &doc, &eval);

        let outcome =
            run_round(&mut cluster, &doc, &eval, 0, None, &ArbitrationConfig::default()).unwrap();
        let spans: Vec<_> = cluster.candidates().iter().map(Candidate::span).collect();
        assert_eq!(spans, vec![UnitSpan::new(1, 2), UnitSpan::single(3)]);
        assert!(!cluster.candidates()[1].is_expandable());
        assert_eq!(outcome.evicted, 0);
    }

    #[test]
    fn stronger_latecomer_evicts_owner() {
        let mut frozen = Candidate::new(0, 1.0);
        frozen.freeze();
        let mut cluster =
            CandidateCluster::from_candidates(0, 0, vec![frozen, Candidate::new(2, 8.0)]);
        cluster.candidates_mut()[1].absorb(UnitSpan::new(0, 2));
        cluster.candidates_mut()[1].rescore(9.0);

        let mut ownership = OwnershipMap::new();
        ownership.claim(UnitSpan::single(0), 0);
        let mut evicted = vec![false, false];
        let start = cluster.candidates()[1].selected_index();
        let resolution = resolve_conflicts(
            cluster.candidates_mut(),
            1,
            start,
            0,
            0.01,
            &mut ownership,
            &mut evicted,
        )
        .unwrap();

        assert_eq!(resolution, Resolution::Resolved);
        assert_eq!(evicted, vec![true, false]);
        assert!(ownership.is_empty());
    }

    #[test]
    fn contested_start_state_is_evicted() {
        let mut cluster = CandidateCluster::from_candidates(
            0,
            0,
            vec![Candidate::new(0, 5.0), Candidate::new(1, 1.0)],
        );
        cluster.candidates_mut()[1].absorb(UnitSpan::new(0, 1));

        let mut ownership = OwnershipMap::new();
        ownership.claim(UnitSpan::single(0), 0);
        let mut evicted = vec![false, false];
        let start = cluster.candidates()[1].selected_index();
        let resolution = resolve_conflicts(
            cluster.candidates_mut(),
            1,
            start,
            0,
            0.01,
            &mut ownership,
            &mut evicted,
        )
        .unwrap();
        assert_eq!(resolution, Resolution::Evicted);
        assert_eq!(evicted, vec![false, false]);
    }

    #[test]
    fn squeezed_between_two_owners_reverts_and_freezes() {
        // @3 prefers [2, 4] but both neighbours hold one of its units and score higher
        let (doc, eval) = weighted(&[0.0, 9.0, 3.0, 1.0, 3.0, 8.0, 0.0]);
        let mut cluster = cluster_of(&[1, 3, 5], &doc, &eval);
        assert_eq!(cluster.anchors(), vec![1, 5, 3]);

        let outcome =
            run_round(&mut cluster, &doc, &eval, 0, None, &ArbitrationConfig::default()).unwrap();
        let spans: Vec<_> = cluster.candidates().iter().map(Candidate::span).collect();
        assert_eq!(
            spans,
            vec![UnitSpan::new(1, 2), UnitSpan::new(4, 5), UnitSpan::single(3)]
        );

        let squeezed = &cluster.candidates()[2];
        assert_eq!(squeezed.context().id(), "003");
        assert!(!squeezed.is_expandable());
        assert!(cluster.candidates()[..2].iter().all(Candidate::is_expandable));
        assert_eq!(outcome.evicted, 0);
        assert_eq!(outcome.ownership.owner(3), Some(2));
    }

    #[test]
    fn squeeze_winner_evicts_both_owners() {
        let mut left = Candidate::new(0, 1.0);
        left.freeze();
        let right = Candidate::new(2, 2.0);
        let mut middle = Candidate::new(1, 3.0);
        middle.absorb(UnitSpan::new(0, 2));
        middle.rescore(9.0);
        let mut cluster = CandidateCluster::from_candidates(0, 0, vec![left, right, middle]);

        let mut ownership = OwnershipMap::new();
        ownership.claim(UnitSpan::single(0), 0);
        ownership.claim(UnitSpan::single(2), 1);
        let mut evicted = vec![false; 3];
        let start = cluster.candidates()[2].selected_index();
        let resolution = resolve_conflicts(
            cluster.candidates_mut(),
            2,
            start,
            0,
            0.01,
            &mut ownership,
            &mut evicted,
        )
        .unwrap();

        assert_eq!(resolution, Resolution::Resolved);
        assert_eq!(evicted, vec![true, true, false]);
        assert!(ownership.is_empty());
    }

    #[test]
    fn iterator_ends_with_converged_snapshot() {
        let (doc, eval) = weighted(&[0.0, 2.0, 2.0, 2.0, 0.0]);
        let mut cluster = cluster_of(&[2], &doc, &eval);

        let snapshots: Vec<_> =
            ContextExpansion::new(&mut cluster, &doc, &eval, ArbitrationConfig::default())
                .collect::<Result<_>>()
                .unwrap();
        let last = snapshots.last().unwrap();
        assert!(last.converged);
        assert!(snapshots[..snapshots.len() - 1].iter().all(|s| !s.converged));
        assert_eq!(last.spans(), vec![UnitSpan::new(1, 3)]);
        assert_eq!(cluster.candidates()[0].history().len(), 1);
    }

    #[test]
    fn empty_cluster_yields_nothing() {
        let (doc, eval) = weighted(&[1.0]);
        let mut cluster = CandidateCluster::new(0, 3, vec![], 0.0);

        let mut expansion =
            ContextExpansion::new(&mut cluster, &doc, &eval, ArbitrationConfig::default());
        assert!(expansion.next().is_none());
        assert_eq!(expansion.rounds(), 0);

        let snapshot =
            expand_cluster(&mut cluster, &doc, &eval, &ArbitrationConfig::default()).unwrap();
        assert!(snapshot.converged);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn foreign_document_is_an_error() {
        let (doc, eval) = weighted(&[1.0]);
        let mut cluster = CandidateCluster::from_candidates(4, 0, vec![Candidate::new(0, 1.0)]);
        let mut expansion =
            ContextExpansion::new(&mut cluster, &doc, &eval, ArbitrationConfig::default());
        assert!(matches!(
            expansion.next(),
            Some(Err(crate::ExpansionError::DocumentMismatch { .. }))
        ));
        assert!(expansion.next().is_none());
    }
}
