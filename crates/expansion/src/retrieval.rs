use crate::cluster::CandidateCluster;
use crate::config::RetrievalMethod;
use crate::error::Result;
use context_chain::{cosine_similarity, ChainError, Clustering, UnitCluster};

/// Admit the unit groups closest to `query_vector` as candidate clusters
///
/// Outlier groups are ignored. Similarities are rounded to three decimals and clusters are
/// returned most similar first (document id, then label, on ties).
pub fn retrieve_clusters<'a>(
    clusterings: impl IntoIterator<Item = &'a Clustering>,
    query_vector: &[f32],
    method: RetrievalMethod,
) -> Result<Vec<CandidateCluster>> {
    let mut scored: Vec<(f32, &UnitCluster)> = Vec::new();
    for group in clusterings
        .into_iter()
        .flat_map(Clustering::iter)
        .filter(|g| !g.is_outlier())
    {
        let Some(centroid) = group.centroid() else {
            continue;
        };
        if centroid.len() != query_vector.len() {
            return Err(ChainError::DimensionMismatch {
                expected: centroid.len(),
                actual: query_vector.len(),
            }
            .into());
        }
        let similarity = (cosine_similarity(centroid, query_vector) * 1000.0).round() / 1000.0;
        scored.push((similarity, group));
    }

    scored.sort_by(|(a, ga), (b, gb)| {
        b.total_cmp(a)
            .then_with(|| ga.document_id.cmp(&gb.document_id))
            .then_with(|| ga.label.cmp(&gb.label))
    });

    let admitted: Vec<CandidateCluster> = match method {
        RetrievalMethod::TopK { k } => scored
            .into_iter()
            .take(k)
            .map(|(similarity, group)| CandidateCluster::from_group(group, similarity))
            .collect(),
        RetrievalMethod::Threshold { min_similarity } => scored
            .into_iter()
            .take_while(|(similarity, _)| *similarity > min_similarity)
            .map(|(similarity, group)| CandidateCluster::from_group(group, similarity))
            .collect(),
    };

    log::debug!(
        "Retrieved {} clusters ({:?})",
        admitted.len(),
        method
    );
    Ok(admitted)
}
