//! Dense embedding vectors.
//!
//! A [`Vector`] is the fixed-length numeric representation of a transcript
//! segment. It persists as a little-endian `f32` blob; a JSON array codec is
//! kept for exports and for rows written by older tooling.

use crate::error::{PodsearchError, Result};
use serde::{Deserialize, Serialize};

/// Bytes per encoded component.
const COMPONENT_BYTES: usize = 4;

/// A dense, ordered sequence of `f32` components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vector(Vec<f32>);

impl Vector {
    /// Wrap raw components.
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Number of components.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// True when no component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|x| x.is_finite())
    }

    /// Dot product, accumulated in `f64`. Mismatched lengths yield 0.0.
    pub fn dot(&self, other: &Vector) -> f64 {
        if self.dim() != other.dim() {
            return 0.0;
        }
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| *a as f64 * *b as f64)
            .sum()
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        self.0.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt()
    }

    /// Cosine similarity against `other`.
    ///
    /// Returns 0.0 when either vector has zero norm, when the vectors are
    /// empty, or when their dimensions differ. Never NaN for finite input.
    pub fn cosine_similarity(&self, other: &Vector) -> f32 {
        if self.dim() != other.dim() || self.is_empty() {
            return 0.0;
        }

        let norm_a = self.norm();
        let norm_b = other.norm();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        let score = self.dot(other) / (norm_a * norm_b);
        // Rounding can push identical vectors a hair past 1.0.
        score.clamp(-1.0, 1.0) as f32
    }

    /// Encode as little-endian `f32` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Decode from little-endian `f32` bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() % COMPONENT_BYTES != 0 {
            return Err(PodsearchError::VectorStore(format!(
                "Invalid vector blob length: {} bytes",
                bytes.len()
            )));
        }

        let values = bytes
            .chunks_exact(COMPONENT_BYTES)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Self(values))
    }

    /// Encode as a JSON array of numbers.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Decode from a JSON array of numbers.
    pub fn from_json(json: &str) -> Result<Self> {
        let values: Vec<f32> = serde_json::from_str(json)?;
        if values.is_empty() {
            return Err(PodsearchError::VectorStore(
                "Vector JSON contains no components".to_string(),
            ));
        }
        Ok(Self(values))
    }
}

impl From<Vec<f32>> for Vector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = Vector::new(vec![1.0, 0.0, 0.0]);
        assert!((a.cosine_similarity(&a) - 1.0).abs() < 1e-6);

        let orthogonal = Vector::new(vec![0.0, 1.0, 0.0]);
        assert!(a.cosine_similarity(&orthogonal).abs() < 1e-6);

        let opposite = Vector::new(vec![-1.0, 0.0, 0.0]);
        assert!((a.cosine_similarity(&opposite) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let a = Vector::new(vec![0.3, 0.4, 0.5]);
        let zero = Vector::new(vec![0.0, 0.0, 0.0]);

        let score = a.cosine_similarity(&zero);
        assert_eq!(score, 0.0);
        assert!(!score.is_nan());
        assert_eq!(zero.cosine_similarity(&zero), 0.0);
    }

    #[test]
    fn test_dimension_mismatch_scores_zero() {
        let a = Vector::new(vec![1.0, 0.0]);
        let b = Vector::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }

    #[test]
    fn test_bytes_round_trip() {
        let v = Vector::new(vec![0.1, -2.5, 3.25e-7, f32::MAX, 0.0]);
        let decoded = Vector::from_bytes(&v.to_bytes()).unwrap();
        assert_eq!(decoded, v);
    }

    #[test]
    fn test_json_round_trip_within_tolerance() {
        let v = Vector::new(vec![0.123_456_78, -0.000_001, 42.0]);
        let decoded = Vector::from_json(&v.to_json().unwrap()).unwrap();

        assert_eq!(decoded.dim(), v.dim());
        for (a, b) in decoded.as_slice().iter().zip(v.as_slice()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_from_bytes_rejects_truncated_blob() {
        assert!(Vector::from_bytes(&[0, 0, 128]).is_err());
        assert!(Vector::from_bytes(&[]).is_err());
    }
}
