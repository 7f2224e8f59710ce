use crate::document::Document;
use crate::error::{ChainError, Result};
use crate::similarity::{cosine_similarity, pool, Pooling};
use crate::types::Unit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label assigned to units that belong to no group
pub const OUTLIER_LABEL: i32 = -1;

/// A labelled group of units from one document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitCluster {
    /// Owning document
    pub document_id: u32,

    /// Group label (negative for the outlier group)
    pub label: i32,

    /// Member units in document order
    units: Vec<Unit>,

    /// Pooled representative, absent for the outlier group
    centroid: Option<Vec<f32>>,

    pooling: Pooling,
}

impl UnitCluster {
    /// Build a group and pool its centroid
    ///
    /// Outlier groups skip pooling, so their members may lack vectors.
    pub fn new(
        document_id: u32,
        label: i32,
        units: Vec<Unit>,
        pooling: Pooling,
        normalize: bool,
    ) -> Result<Self> {
        if units.is_empty() {
            return Err(ChainError::EmptyCluster);
        }

        let centroid = if label >= 0 {
            let vectors = member_vectors(&units)?;
            Some(pool(&vectors, pooling, normalize)?)
        } else {
            None
        };

        Ok(Self {
            document_id,
            label,
            units,
            centroid,
            pooling,
        })
    }

    #[must_use]
    pub fn is_outlier(&self) -> bool {
        self.label < 0
    }

    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    #[must_use]
    pub fn centroid(&self) -> Option<&[f32]> {
        self.centroid.as_deref()
    }

    #[must_use]
    pub const fn pooling(&self) -> Pooling {
        self.pooling
    }

    /// `DDDD_LL` identifier
    #[must_use]
    pub fn id(&self) -> String {
        format!("{:04}_{:02}", self.document_id, self.label)
    }

    /// Member texts separated by blank lines
    #[must_use]
    pub fn text(&self) -> String {
        self.units
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Member positions ordered by summed cosine similarity to the rest of the group
    ///
    /// Returns `None` for the outlier group.
    pub fn similarity_order(&self) -> Result<Option<Vec<usize>>> {
        if self.is_outlier() {
            return Ok(None);
        }

        let vectors = member_vectors(&self.units)?;
        let sums: Vec<f32> = vectors
            .iter()
            .map(|a| vectors.iter().map(|b| cosine_similarity(a, b)).sum())
            .collect();

        let mut order: Vec<usize> = (0..self.units.len()).collect();
        order.sort_by(|&a, &b| sums[b].total_cmp(&sums[a]));
        Ok(Some(order))
    }

    /// The member with the k-th highest similarity to the rest of the group
    pub fn kth_most_similar(&self, k: usize) -> Result<Option<&Unit>> {
        Ok(self
            .similarity_order()?
            .and_then(|order| order.get(k).copied())
            .map(|pos| &self.units[pos]))
    }
}

fn member_vectors(units: &[Unit]) -> Result<Vec<&[f32]>> {
    units
        .iter()
        .map(|u| u.vector.as_deref().ok_or(ChainError::MissingVector(u.index)))
        .collect()
}

/// All groups of one document, keyed by label
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clustering {
    pub document_id: u32,
    clusters: BTreeMap<i32, UnitCluster>,
}

impl Clustering {
    /// Group the units of `document` by externally computed labels (one per unit)
    pub fn from_labels(
        document: &Document,
        labels: &[i32],
        pooling: Pooling,
        normalize: bool,
    ) -> Result<Self> {
        if labels.len() != document.len() {
            return Err(ChainError::LabelCountMismatch {
                expected: document.len(),
                actual: labels.len(),
            });
        }

        let mut groups: BTreeMap<i32, Vec<Unit>> = BTreeMap::new();
        for (unit, &label) in document.units().iter().zip(labels) {
            let label = label.max(OUTLIER_LABEL);
            groups.entry(label).or_default().push(unit.clone());
        }

        let clusters = groups
            .into_iter()
            .map(|(label, units)| {
                UnitCluster::new(document.id, label, units, pooling, normalize)
                    .map(|cluster| (label, cluster))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        log::debug!(
            "Document {}: {} unit groups ({} units)",
            document.id,
            clusters.len(),
            document.len()
        );

        Ok(Self {
            document_id: document.id,
            clusters,
        })
    }

    #[must_use]
    pub fn get(&self, label: i32) -> Option<&UnitCluster> {
        self.clusters.get(&label)
    }

    /// Groups in label order (the outlier group first, when present)
    pub fn iter(&self) -> impl Iterator<Item = &UnitCluster> {
        self.clusters.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
