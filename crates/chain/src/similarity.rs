use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};

/// How a group representative is built from member vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pooling {
    /// Element-wise mean
    #[default]
    Average,
    /// Element-wise maximum
    Max,
}

/// Cosine of the angle between `a` and `b`
///
/// Vectors of different length or with a zero norm score 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let (dot, sq_a, sq_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, sq_a, sq_b), (x, y)| {
            (dot + x * y, sq_a + x * x, sq_b + y * y)
        });
    let denominator = (sq_a * sq_b).sqrt();
    if denominator > 0.0 {
        dot / denominator
    } else {
        0.0
    }
}

/// Scale `v` to unit length (zero vectors are returned unchanged)
#[must_use]
pub fn normalized(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Pool member vectors into one representative
///
/// A single vector is returned as-is, without normalization.
pub fn pool(vectors: &[&[f32]], pooling: Pooling, normalize: bool) -> Result<Vec<f32>> {
    let (first, rest) = vectors.split_first().ok_or(ChainError::EmptyCluster)?;
    if rest.is_empty() {
        return Ok(first.to_vec());
    }

    let dim = first.len();
    if let Some(bad) = rest.iter().find(|v| v.len() != dim) {
        return Err(ChainError::DimensionMismatch {
            expected: dim,
            actual: bad.len(),
        });
    }

    let mut pooled = first.to_vec();
    for v in rest {
        for (acc, x) in pooled.iter_mut().zip(v.iter()) {
            match pooling {
                Pooling::Average => *acc += x,
                Pooling::Max => *acc = acc.max(*x),
            }
        }
    }
    if pooling == Pooling::Average {
        let count = vectors.len() as f32;
        pooled.iter_mut().for_each(|x| *x /= count);
    }

    Ok(if normalize { normalized(pooled) } else { pooled })
}
