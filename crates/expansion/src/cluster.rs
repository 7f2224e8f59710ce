use crate::candidate::Candidate;
use crate::config::SelectionPolicy;
use crate::error::{ExpansionError, Result};
use crate::oracle::{Evaluator, RelevanceOracle};
use context_chain::{Document, Unit, UnitCluster, UnitSpan};
use std::collections::HashSet;

/// Candidates of one unit group, competing over the same document
///
/// Candidates are kept in priority order (highest score first) once evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateCluster {
    document_id: u32,
    label: i32,
    members: Vec<usize>,
    similarity: f32,
    candidates: Vec<Candidate>,
}

impl CandidateCluster {
    /// An unevaluated cluster over the given member unit indices
    #[must_use]
    pub fn new(document_id: u32, label: i32, members: Vec<usize>, similarity: f32) -> Self {
        Self {
            document_id,
            label,
            members,
            similarity,
            candidates: Vec::new(),
        }
    }

    /// Wrap a retrieved unit group
    #[must_use]
    pub fn from_group(group: &UnitCluster, similarity: f32) -> Self {
        let members = group.units().iter().map(|u| u.index).collect();
        Self::new(group.document_id, group.label, members, similarity)
    }

    /// A cluster over already-scored candidates, kept in the given order
    #[must_use]
    pub fn from_candidates(document_id: u32, label: i32, candidates: Vec<Candidate>) -> Self {
        let members = candidates.iter().map(Candidate::anchor).collect();
        Self {
            document_id,
            label,
            members,
            similarity: 0.0,
            candidates,
        }
    }

    #[must_use]
    pub const fn document_id(&self) -> u32 {
        self.document_id
    }

    #[must_use]
    pub const fn label(&self) -> i32 {
        self.label
    }

    /// `DDDD_LL` identifier of the source group
    #[must_use]
    pub fn id(&self) -> String {
        format!("{:04}_{:02}", self.document_id, self.label)
    }

    /// Query similarity the cluster was admitted with
    #[must_use]
    pub const fn similarity(&self) -> f32 {
        self.similarity
    }

    #[must_use]
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub(crate) fn candidates_mut(&mut self) -> &mut Vec<Candidate> {
        &mut self.candidates
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub(crate) fn ensure_document(&self, document: &Document) -> Result<()> {
        if document.id == self.document_id {
            Ok(())
        } else {
            Err(ExpansionError::DocumentMismatch {
                expected: self.document_id,
                actual: document.id,
            })
        }
    }

    /// Score every member unit in one batched call and seed one candidate per unit
    pub fn evaluate<O: RelevanceOracle>(
        &mut self,
        document: &Document,
        evaluator: &Evaluator<O>,
    ) -> Result<&mut Self> {
        self.ensure_document(document)?;

        let units = self
            .members
            .iter()
            .map(|&index| {
                document
                    .unit(index)
                    .cloned()
                    .ok_or(context_chain::ChainError::UnitNotFound(index))
            })
            .collect::<std::result::Result<Vec<Unit>, _>>()?;
        let scores = evaluator.predict_each(&units)?;

        self.candidates = units
            .iter()
            .zip(scores)
            .map(|(unit, score)| Candidate::new(unit.index, score))
            .collect();
        self.rerank();

        log::debug!(
            "cluster {}: evaluated {} units, cross score {:.3}",
            self.id(),
            self.candidates.len(),
            self.cross_score()
        );
        Ok(self)
    }

    /// Drop candidates whose window repeats an earlier one
    pub fn remove_duplicates(&mut self) -> &mut Self {
        let mut seen: HashSet<UnitSpan> = HashSet::new();
        self.candidates.retain(|c| seen.insert(c.span()));
        self
    }

    /// Sort by score (descending), lower anchor first on ties
    pub fn rerank(&mut self) -> &mut Self {
        self.candidates.sort_by(|a, b| {
            b.score()
                .total_cmp(&a.score())
                .then_with(|| a.anchor().cmp(&b.anchor()))
        });
        self
    }

    /// Keep only candidates scoring above `threshold`
    pub fn filter(&mut self, threshold: f32) -> &mut Self {
        self.candidates.retain(|c| c.score() > threshold);
        self
    }

    /// Re-run the oracle on every selected window, in one batched call
    pub fn rescore<O: RelevanceOracle>(
        &mut self,
        document: &Document,
        evaluator: &Evaluator<O>,
    ) -> Result<&mut Self> {
        let spans = self
            .candidates
            .iter()
            .map(|c| document.slice(c.span()))
            .collect::<context_chain::Result<Vec<_>>>()?;
        let scores = evaluator.predict_spans(&spans)?;

        for (candidate, score) in self.candidates.iter_mut().zip(scores) {
            candidate.rescore(score);
        }
        Ok(self)
    }

    /// Merge windows that overlap or touch and sit on the same side of `threshold`
    ///
    /// Candidates are scanned in document order; merged windows are rescored and the
    /// cluster reranked.
    pub fn merge<O: RelevanceOracle>(
        &mut self,
        threshold: f32,
        document: &Document,
        evaluator: &Evaluator<O>,
    ) -> Result<&mut Self> {
        if self.candidates.is_empty() {
            return Ok(self);
        }

        let mut pending = std::mem::take(&mut self.candidates);
        pending.sort_by_key(|c| c.span().first);

        let mut pending = pending.into_iter();
        let mut kept = Vec::new();
        let mut merges = 0usize;
        let Some(mut current) = pending.next() else {
            return Ok(self);
        };
        let mut current_score = current.score();

        for candidate in pending {
            let same_side = (current_score - threshold) * (candidate.score() - threshold) >= 0.0;
            let (span, other) = (current.span(), candidate.span());
            if same_side && span.touches(&other) {
                log::debug!(
                    "cluster {}: merging {} into {}",
                    self.id(),
                    other,
                    span
                );
                current.absorb(span.union(&other));
                merges += 1;
            } else {
                kept.push(current);
                current = candidate;
                current_score = current.score();
            }
        }
        kept.push(current);

        self.candidates = kept;
        if merges > 0 {
            self.rescore(document, evaluator)?;
        }
        self.rerank();
        Ok(self)
    }

    /// Scores in candidate order
    #[must_use]
    pub fn scores(&self) -> Vec<f32> {
        self.candidates.iter().map(Candidate::score).collect()
    }

    /// Anchor units in candidate order
    #[must_use]
    pub fn anchors(&self) -> Vec<usize> {
        self.candidates.iter().map(Candidate::anchor).collect()
    }

    /// Summed candidate scores (three decimals)
    #[must_use]
    pub fn cross_score(&self) -> f32 {
        round3(self.candidates.iter().map(Candidate::score).sum())
    }

    /// Candidates worth keeping under `policy`
    ///
    /// A cluster whose cross score clears the cluster threshold keeps everything;
    /// otherwise only individually strong candidates survive.
    #[must_use]
    pub fn selected_candidates(&self, policy: &SelectionPolicy) -> Vec<&Candidate> {
        if self.cross_score() > policy.cluster_threshold {
            self.candidates.iter().collect()
        } else {
            self.candidates
                .iter()
                .filter(|c| c.score() > policy.candidate_threshold)
                .collect()
        }
    }

    /// Summed scores of the selected candidates (three decimals)
    #[must_use]
    pub fn selected_cross_score(&self, policy: &SelectionPolicy) -> f32 {
        round3(
            self.selected_candidates(policy)
                .into_iter()
                .map(Candidate::score)
                .sum(),
        )
    }

    /// Selected windows in document order, separated by blank lines
    pub fn text(&self, document: &Document, policy: &SelectionPolicy) -> Result<String> {
        let mut selected = self.selected_candidates(policy);
        selected.sort_by_key(|c| c.span().first);
        let texts = selected
            .into_iter()
            .map(|c| c.text(document))
            .collect::<Result<Vec<_>>>()?;
        Ok(texts.join("\n\n"))
    }
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}
