use crate::error::{ExpansionError, Result};
use context_chain::Unit;

/// Scores how relevant a run of units is to a query
///
/// Implementations must be deterministic for identical input text: arbitration outcomes
/// are only reproducible when the same window always gets the same score.
pub trait RelevanceOracle {
    /// Score `units` as one input sequence
    fn score(&self, query: &str, units: &[Unit]) -> Result<f32>;

    /// Score several sequences; one score per span, in order
    fn score_many(&self, query: &str, spans: &[&[Unit]]) -> Result<Vec<f32>> {
        spans.iter().map(|units| self.score(query, units)).collect()
    }
}

impl<F> RelevanceOracle for F
where
    F: Fn(&str, &[Unit]) -> f32,
{
    fn score(&self, query: &str, units: &[Unit]) -> Result<f32> {
        Ok(self(query, units))
    }
}

/// Concatenated text of a window, as handed to text-based scorers
#[must_use]
pub fn joined_text(units: &[Unit]) -> String {
    units.iter().map(|u| u.text.as_str()).collect()
}

/// A query bound to the oracle that judges relevance against it
#[derive(Debug, Clone)]
pub struct Evaluator<O> {
    query: String,
    oracle: O,
}

impl<O: RelevanceOracle> Evaluator<O> {
    pub fn new(query: impl Into<String>, oracle: O) -> Self {
        Self {
            query: query.into(),
            oracle,
        }
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Score all `units` together as a single window
    pub fn predict(&self, units: &[Unit]) -> Result<f32> {
        let score = self.oracle.score(&self.query, units)?;
        ensure_finite(score)
    }

    /// Score every unit on its own, in one batched call
    pub fn predict_each(&self, units: &[Unit]) -> Result<Vec<f32>> {
        let spans: Vec<&[Unit]> = units.iter().map(std::slice::from_ref).collect();
        self.predict_spans(&spans)
    }

    /// Score several windows in one batched call
    pub fn predict_spans(&self, spans: &[&[Unit]]) -> Result<Vec<f32>> {
        if spans.is_empty() {
            return Ok(Vec::new());
        }

        let scores = self.oracle.score_many(&self.query, spans)?;
        if scores.len() != spans.len() {
            return Err(ExpansionError::OracleArity {
                expected: spans.len(),
                actual: scores.len(),
            });
        }
        scores.into_iter().map(ensure_finite).collect()
    }
}

fn ensure_finite(score: f32) -> Result<f32> {
    if score.is_finite() {
        Ok(score)
    } else {
        Err(ExpansionError::oracle(format!("non-finite score {score}")))
    }
}
