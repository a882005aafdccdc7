/*!
 * Feature extraction collaborator.
 *
 * Turning imagery into an embedding happens outside this service. The
 * default extractor accepts a precomputed embedding so the pipeline can run
 * end to end; a real model plugs in behind the same trait.
 */

use crate::error::{Error, Result};
use crate::features::FeatureVector;

pub trait FeatureExtractor: Send + Sync {
    /// Errors are passed to the caller unchanged and never retried.
    fn extract(&self, image: &[u8]) -> Result<FeatureVector>;
}

/// Reads the payload as `dimension` little-endian `f32` components.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingExtractor {
    dimension: usize,
}

impl EmbeddingExtractor {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Inverse of [`extract`](FeatureExtractor::extract), for clients and tests.
    pub fn encode(vector: &FeatureVector) -> Vec<u8> {
        vector
            .as_slice()
            .iter()
            .flat_map(|&x| (x as f32).to_le_bytes())
            .collect()
    }
}

impl FeatureExtractor for EmbeddingExtractor {
    fn extract(&self, image: &[u8]) -> Result<FeatureVector> {
        if image.is_empty() {
            return Err(Error::UnreadableImage("empty payload".to_string()));
        }
        if image.len() % 4 != 0 {
            return Err(Error::UnreadableImage(format!(
                "payload length {} is not a whole number of f32 components",
                image.len()
            )));
        }

        let components: Vec<f64> = image
            .chunks_exact(4)
            .map(|chunk| f64::from(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
            .collect();

        if components.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: components.len(),
            });
        }
        if components.iter().all(|&x| x == 0.0) {
            return Err(Error::NoSubjectDetected);
        }

        Ok(FeatureVector::new(components))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_roundtrip() {
        let extractor = EmbeddingExtractor::new(3);
        let v = FeatureVector::new(vec![0.5, -0.25, 1.0]);
        let extracted = extractor.extract(&EmbeddingExtractor::encode(&v)).unwrap();
        assert_eq!(extracted, v);
    }

    #[test]
    fn test_empty_payload_unreadable() {
        let extractor = EmbeddingExtractor::new(3);
        assert!(matches!(
            extractor.extract(&[]),
            Err(Error::UnreadableImage(_))
        ));
    }

    #[test]
    fn test_ragged_payload_unreadable() {
        let extractor = EmbeddingExtractor::new(3);
        assert!(matches!(
            extractor.extract(&[0u8; 7]),
            Err(Error::UnreadableImage(_))
        ));
    }

    #[test]
    fn test_all_zero_embedding_has_no_subject() {
        let extractor = EmbeddingExtractor::new(2);
        assert!(matches!(
            extractor.extract(&[0u8; 8]),
            Err(Error::NoSubjectDetected)
        ));
    }

    #[test]
    fn test_wrong_component_count() {
        let extractor = EmbeddingExtractor::new(4);
        let payload = EmbeddingExtractor::encode(&FeatureVector::new(vec![1.0; 2]));
        assert!(matches!(
            extractor.extract(&payload),
            Err(Error::DimensionMismatch {
                expected: 4,
                actual: 2
            })
        ));
    }
}
