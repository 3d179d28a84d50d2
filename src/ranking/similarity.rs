//! Query validation and cosine scoring

use crate::corpus::RecordDefect;
use crate::search::SearchError;

/// A validated query vector with its magnitude precomputed
#[derive(Debug, Clone)]
pub struct QueryVector<'a> {
    components: &'a [f32],
    norm: f64,
}

impl<'a> QueryVector<'a> {
    /// Reject empty, non-finite, or zero-magnitude query vectors
    #[inline]
    pub fn new(components: &'a [f32]) -> Result<Self, SearchError> {
        if components.is_empty() {
            return Err(SearchError::invalid_query_vector("vector is empty"));
        }

        if let Some(position) = components.iter().position(|c| !c.is_finite()) {
            return Err(SearchError::invalid_query_vector(format!(
                "component {} is not finite",
                position
            )));
        }

        let norm = magnitude(components);
        if norm <= f64::EPSILON {
            return Err(SearchError::invalid_query_vector("vector has zero magnitude"));
        }

        Ok(Self { components, norm })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.components.len()
    }

    /// Cosine similarity against a record vector of the same dimension
    ///
    /// Both vectors are normalized, so the score is bounded to [-1, 1] even
    /// when stored vectors are not unit length.
    #[inline]
    pub fn score(&self, vector: &[f32]) -> Result<f32, RecordDefect> {
        debug_assert_eq!(vector.len(), self.components.len());

        let mut dot = 0.0f64;
        let mut norm_sq = 0.0f64;
        for (&q, &r) in self.components.iter().zip(vector) {
            let r = f64::from(r);
            dot = f64::from(q).mul_add(r, dot);
            norm_sq = r.mul_add(r, norm_sq);
        }

        let record_norm = norm_sq.sqrt();
        if record_norm <= f64::EPSILON {
            return Err(RecordDefect::ZeroNorm);
        }

        let cosine = (dot / (self.norm * record_norm)).clamp(-1.0, 1.0);
        Ok(cosine as f32)
    }
}

fn magnitude(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|&c| f64::from(c) * f64::from(c))
        .sum::<f64>()
        .sqrt()
}
