use crate::candidate::Candidate;
use crate::cluster::CandidateCluster;
use crate::error::Result;
use crate::state::GrowthAction;
use context_chain::{Document, UnitSpan};
use serde::Serialize;
use std::fmt;

/// One surviving candidate as seen at the end of a round
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    /// Priority position (0 = highest score)
    pub rank: usize,
    pub anchor: usize,
    pub span: UnitSpan,
    pub score: f32,
    pub actions: Vec<GrowthAction>,
    pub expandable: bool,
    pub text: String,
}

impl SnapshotEntry {
    fn capture(rank: usize, candidate: &Candidate, document: &Document) -> Result<Self> {
        let context = candidate.context();
        Ok(Self {
            rank,
            anchor: candidate.anchor(),
            span: context.span(),
            score: context.score(),
            actions: context.actions().to_vec(),
            expandable: candidate.is_expandable(),
            text: candidate.text(document)?,
        })
    }
}

/// Ranked view of a cluster after one arbitration round
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundSnapshot {
    pub cluster_id: String,
    pub round: usize,
    /// True for the final snapshot of a run
    pub converged: bool,
    pub entries: Vec<SnapshotEntry>,
}

impl RoundSnapshot {
    pub(crate) fn capture(
        cluster: &CandidateCluster,
        document: &Document,
        round: usize,
        converged: bool,
    ) -> Result<Self> {
        let entries = cluster
            .candidates()
            .iter()
            .enumerate()
            .map(|(rank, candidate)| SnapshotEntry::capture(rank, candidate, document))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            cluster_id: cluster.id(),
            round,
            converged,
            entries,
        })
    }

    /// Selected windows in rank order
    #[must_use]
    pub fn spans(&self) -> Vec<UnitSpan> {
        self.entries.iter().map(|e| e.span).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for RoundSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.converged { "converged" } else { "running" };
        writeln!(f, "cluster {} round {} ({status})", self.cluster_id, self.round)?;
        for entry in &self.entries {
            let actions = entry
                .actions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                f,
                "  #{} anchor {:03} [{}] score {:.3}{} [{actions}]",
                entry.rank,
                entry.anchor,
                entry.span,
                entry.score,
                if entry.expandable { "" } else { " frozen" },
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn captures_ranked_entries() {
        let document = Document::from_texts(1, ["a ", "b ", "c "]).unwrap();
        let mut frozen = Candidate::new(2, 1.0);
        frozen.freeze();
        let cluster =
            CandidateCluster::from_candidates(1, 4, vec![Candidate::new(0, 5.0), frozen]);

        let snapshot = RoundSnapshot::capture(&cluster, &document, 3, false).unwrap();
        assert_eq!(snapshot.cluster_id, "0001_04");
        assert_eq!(snapshot.spans(), vec![UnitSpan::single(0), UnitSpan::single(2)]);
        assert_eq!(snapshot.entries[1].rank, 1);
        assert_eq!(snapshot.entries[1].text, "c ");

        let rendered = snapshot.to_string();
        assert!(rendered.starts_with("cluster 0001_04 round 3 (running)"));
        assert!(rendered.contains("#1 anchor 002 [002] score 1.000 frozen"));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["entries"][0]["span"]["first"], 0);
        assert_eq!(json["converged"], false);
    }
}
