/*!
 * Biometric Matcher
 * Fuzzy comparison of a fresh feature vector against an enrolled one.
 *
 * Acceptance is not tied to the identity digest: two vectors may match
 * while hashing to different digests.
 */

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::features::{FeatureVector, Normalizer};

/// Face-embedding tolerance used when none is configured.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// L2 distance.
    Euclidean,
    /// `1 - cos(theta)`, in `[0, 2]`.
    Cosine,
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(Metric::Euclidean),
            "cosine" => Ok(Metric::Cosine),
            other => Err(format!("unknown match metric: {other}")),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Euclidean => f.write_str("euclidean"),
            Metric::Cosine => f.write_str("cosine"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MatchResult {
    pub accepted: bool,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct BiometricMatcher {
    dimension: usize,
    metric: Metric,
    threshold: f64,
}

impl BiometricMatcher {
    pub fn new(dimension: usize, metric: Metric, threshold: f64) -> Self {
        Self {
            dimension,
            metric,
            threshold,
        }
    }

    pub fn for_normalizer(normalizer: &Normalizer, metric: Metric, threshold: f64) -> Self {
        Self::new(normalizer.dimension(), metric, threshold)
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn matches(&self, fresh: &FeatureVector, enrolled: &FeatureVector) -> Result<bool> {
        Ok(self.compare(fresh, enrolled)?.accepted)
    }

    /// Accepts on the boundary: `distance <= threshold`.
    pub fn compare(&self, fresh: &FeatureVector, enrolled: &FeatureVector) -> Result<MatchResult> {
        for vector in [fresh, enrolled] {
            if vector.len() != self.dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }

        let distance = match self.metric {
            Metric::Euclidean => euclidean(fresh.as_slice(), enrolled.as_slice()),
            Metric::Cosine => cosine_distance(fresh.as_slice(), enrolled.as_slice())?,
        };
        if !distance.is_finite() {
            return Err(Error::InvalidFeature(
                "distance is not finite".to_string(),
            ));
        }

        Ok(MatchResult {
            accepted: distance <= self.threshold,
            distance,
        })
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn cosine_distance(a: &[f64], b: &[f64]) -> Result<f64> {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(Error::InvalidFeature(
            "cosine distance of a zero vector".to_string(),
        ));
    }
    // dot / (|a|·|b|) can land an ulp below 1 for a == b
    if a == b {
        return Ok(0.0);
    }

    let similarity = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    Ok(1.0 - similarity)
}
