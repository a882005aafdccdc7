/*!
 * Feature Normalizer
 * Fixes the numeric precision of extractor output so an already-matched
 * vector always encodes to the same bytes. This is not a denoising step.
 */

use std::fmt;

use crate::error::{Error, Result};

/// Largest supported number of fractional digits.
pub const MAX_DECIMALS: u8 = 12;

/// Fixed-point magnitudes must stay exactly representable as `f64`.
const MAX_FIXED_POINT: f64 = 9_007_199_254_740_992.0; // 2^53

/// Ordered biometric feature components as produced by an extractor.
#[derive(Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(components: Vec<f64>) -> Self {
        Self(components)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Components are biometric data; keep them out of logs.
impl fmt::Debug for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureVector")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    dimension: usize,
    decimals: u8,
}

impl Normalizer {
    pub fn new(dimension: usize, decimals: u8) -> Self {
        Self {
            dimension,
            decimals: decimals.min(MAX_DECIMALS),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn check_dimension(&self, vector: &FeatureVector) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::InvalidFeature("feature vector is empty".to_string()));
        }
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Fixed-point form of each component: `round(x * 10^decimals)`.
    ///
    /// Rounding is half away from zero. Fails before touching any component
    /// if the dimension is wrong.
    pub fn fixed_point(&self, vector: &FeatureVector) -> Result<Vec<i64>> {
        self.check_dimension(vector)?;

        let scale = self.scale();
        vector
            .as_slice()
            .iter()
            .enumerate()
            .map(|(index, &x)| {
                if !x.is_finite() {
                    return Err(Error::InvalidFeature(format!(
                        "component {index} is not finite"
                    )));
                }
                let scaled = (x * scale).round();
                if scaled.abs() >= MAX_FIXED_POINT {
                    return Err(Error::InvalidFeature(format!(
                        "component {index} is out of range"
                    )));
                }
                Ok(scaled as i64)
            })
            .collect()
    }

    /// Canonical form of `vector` at the configured precision.
    pub fn normalize(&self, vector: &FeatureVector) -> Result<FeatureVector> {
        let scale = self.scale();
        let components = self
            .fixed_point(vector)?
            .into_iter()
            .map(|k| k as f64 / scale)
            .collect();
        Ok(FeatureVector(components))
    }

    fn scale(&self) -> f64 {
        10f64.powi(i32::from(self.decimals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rounds_to_precision() {
        let normalizer = Normalizer::new(3, 2);
        let v = FeatureVector::new(vec![0.123, -0.456, 1.0]);
        let n = normalizer.normalize(&v).unwrap();
        assert_eq!(n.as_slice(), &[0.12, -0.46, 1.0]);
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        let normalizer = Normalizer::new(2, 0);
        let v = FeatureVector::new(vec![2.5, -2.5]);
        assert_eq!(normalizer.fixed_point(&v).unwrap(), vec![3, -3]);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let normalizer = Normalizer::new(4, 6);
        let v = FeatureVector::new(vec![0.1234567, -0.7654321, 0.000_000_4, 0.3]);
        let once = normalizer.normalize(&v).unwrap();
        let twice = normalizer.normalize(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(
            normalizer.fixed_point(&once).unwrap(),
            normalizer.fixed_point(&v).unwrap()
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let normalizer = Normalizer::new(4, 6);
        let err = normalizer
            .normalize(&FeatureVector::new(vec![0.0; 3]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let normalizer = Normalizer::new(2, 6);
        let err = normalizer
            .normalize(&FeatureVector::new(vec![0.5, f64::NAN]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFeature(_)));

        let err = normalizer
            .normalize(&FeatureVector::new(vec![f64::INFINITY, 0.5]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFeature(_)));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let normalizer = Normalizer::new(1, 6);
        let err = normalizer
            .normalize(&FeatureVector::new(vec![1e12]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFeature(_)));
    }

    #[test]
    fn test_fixed_point_bound_is_exact_f64_range() {
        let normalizer = Normalizer::new(1, 0);
        let largest = MAX_FIXED_POINT - 1.0;
        assert_eq!(
            normalizer
                .fixed_point(&FeatureVector::new(vec![-largest]))
                .unwrap(),
            vec![-(largest as i64)]
        );
        assert!(matches!(
            normalizer.fixed_point(&FeatureVector::new(vec![MAX_FIXED_POINT])),
            Err(Error::InvalidFeature(_))
        ));
    }

    #[test]
    fn test_empty_vector_rejected() {
        let normalizer = Normalizer::new(0, 6);
        let empty = FeatureVector::new(Vec::new());
        assert!(empty.is_empty());
        assert!(matches!(
            normalizer.normalize(&empty),
            Err(Error::InvalidFeature(_))
        ));
    }

    #[test]
    fn test_decimals_clamped() {
        assert_eq!(Normalizer::new(1, 40).decimals(), MAX_DECIMALS);
    }

    #[test]
    fn test_debug_hides_components() {
        let v = FeatureVector::new(vec![0.42, 0.17]);
        let rendered = format!("{v:?}");
        assert!(rendered.contains("len: 2"));
        assert!(!rendered.contains("0.42"));
    }
}
