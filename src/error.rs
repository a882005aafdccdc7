/*!
 * Error taxonomy for the enrollment core.
 *
 * Every failure is a typed outcome scoped to the request that caused it.
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("feature vector has {actual} components, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid feature vector: {0}")]
    InvalidFeature(String),

    #[error("identity label already registered: {0}")]
    AlreadyRegistered(String),

    #[error("no registration found for identity label: {0}")]
    NotRegistered(String),

    #[error("key authority is not initialized")]
    AuthorityUnavailable,

    #[error("biometric sample does not match the enrolled sample")]
    BiometricMismatch,

    /// Deliberately carries no detail: a wrong password and a damaged
    /// record must be indistinguishable to the caller.
    #[error("wrong password or corrupted credential")]
    WrongPasswordOrCorrupted,

    #[error("unreadable image: {0}")]
    UnreadableImage(String),

    #[error("no subject detected in image")]
    NoSubjectDetected,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::DimensionMismatch { .. } => "dimension_mismatch",
            Error::InvalidFeature(_) => "invalid_feature",
            Error::AlreadyRegistered(_) => "already_registered",
            Error::NotRegistered(_) => "not_registered",
            Error::AuthorityUnavailable => "authority_unavailable",
            Error::BiometricMismatch => "biometric_mismatch",
            Error::WrongPasswordOrCorrupted => "wrong_password_or_corrupted",
            Error::UnreadableImage(_) => "unreadable_image",
            Error::NoSubjectDetected => "no_subject_detected",
            Error::Storage(_) => "storage",
            Error::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_password_message_has_no_detail() {
        let msg = Error::WrongPasswordOrCorrupted.to_string();
        assert_eq!(msg, "wrong password or corrupted credential");
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = Error::DimensionMismatch {
            expected: 128,
            actual: 3,
        };
        assert_eq!(err.to_string(), "feature vector has 3 components, expected 128");
        assert_eq!(err.kind(), "dimension_mismatch");
    }
}
