/*!
 * Canonical Identity Hasher
 * Maps a normalized feature vector to the fixed-length identity string
 * consumed by the key authority.
 */

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::features::{FeatureVector, Normalizer};

const IDENTITY_DOMAIN: &[u8] = b"biokey/identity/v1";

pub const DIGEST_LEN: usize = 32;

/// SHA-256 over the canonical encoding of a normalized feature vector.
///
/// Treat this as an identifier for one enrollment capture. Two captures of
/// the same subject generally hash differently.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanonicalDigest([u8; DIGEST_LEN]);

impl CanonicalDigest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for CanonicalDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CanonicalDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalDigest({})", self.to_hex())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IdentityHasher {
    normalizer: Normalizer,
}

impl IdentityHasher {
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer }
    }

    pub fn digest(&self, vector: &FeatureVector) -> Result<CanonicalDigest> {
        let encoded = self.canonical_bytes(vector)?;

        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        Ok(CanonicalDigest(hasher.finalize().into()))
    }

    /// Byte encoding hashed by [`digest`](Self::digest):
    /// domain tag, `u32` BE dimension, `u8` decimals, then each fixed-point
    /// component as `i64` BE.
    pub fn canonical_bytes(&self, vector: &FeatureVector) -> Result<Vec<u8>> {
        let fixed = self.normalizer.fixed_point(vector)?;

        let mut out = Vec::with_capacity(IDENTITY_DOMAIN.len() + 5 + fixed.len() * 8);
        out.extend_from_slice(IDENTITY_DOMAIN);
        out.extend_from_slice(&(fixed.len() as u32).to_be_bytes());
        out.push(self.normalizer.decimals());
        for k in fixed {
            out.extend_from_slice(&k.to_be_bytes());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn hasher(dimension: usize) -> IdentityHasher {
        IdentityHasher::new(Normalizer::new(dimension, 6))
    }

    #[test]
    fn test_digest_deterministic() {
        let h = hasher(3);
        let v = FeatureVector::new(vec![0.25, -0.5, 0.125]);
        assert_eq!(h.digest(&v).unwrap(), h.digest(&v).unwrap());
    }

    #[test]
    fn test_digest_known_value_is_stable() {
        // Pins the canonical encoding; changing it re-keys every identity.
        let h = hasher(2);
        let v = FeatureVector::new(vec![1.0, -1.0]);
        let bytes = h.canonical_bytes(&v).unwrap();

        let mut expected = b"biokey/identity/v1".to_vec();
        expected.extend_from_slice(&[0, 0, 0, 2, 6]);
        expected.extend_from_slice(&1_000_000i64.to_be_bytes());
        expected.extend_from_slice(&(-1_000_000i64).to_be_bytes());
        assert_eq!(bytes, expected);

        let mut sha = Sha256::new();
        sha.update(&expected);
        let want: [u8; 32] = sha.finalize().into();
        assert_eq!(h.digest(&v).unwrap().as_bytes(), &want);
    }

    #[test]
    fn test_digest_ignores_sub_precision_noise() {
        let h = hasher(2);
        let a = FeatureVector::new(vec![0.1, 0.2]);
        let b = FeatureVector::new(vec![0.100_000_01, 0.199_999_99]);
        assert_eq!(h.digest(&a).unwrap(), h.digest(&b).unwrap());
    }

    #[test]
    fn test_digest_differs_for_different_vectors() {
        let h = hasher(2);
        let a = FeatureVector::new(vec![0.1, 0.2]);
        let b = FeatureVector::new(vec![0.1, 0.3]);
        assert_ne!(h.digest(&a).unwrap(), h.digest(&b).unwrap());
    }

    #[test]
    fn test_digest_depends_on_precision() {
        let v = FeatureVector::new(vec![0.5, 0.5]);
        let coarse = IdentityHasher::new(Normalizer::new(2, 2));
        let fine = IdentityHasher::new(Normalizer::new(2, 6));
        assert_ne!(coarse.digest(&v).unwrap(), fine.digest(&v).unwrap());
    }

    #[test]
    fn test_digest_dimension_mismatch() {
        let err = hasher(4)
            .digest(&FeatureVector::new(vec![0.1; 5]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 4,
                actual: 5
            }
        ));
    }

    #[test]
    fn test_display_is_hex() {
        let d = CanonicalDigest::from_bytes([0xab; 32]);
        assert_eq!(d.to_string(), "ab".repeat(32));
    }
}
