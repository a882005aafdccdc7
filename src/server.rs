/*!
 * HTTP surface
 * JSON routes for registration, verification and key recovery.
 */

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::enrollment::EnrollmentService;
use crate::error::Error;

#[derive(Clone)]
pub struct AppState {
    pub enrollment: Arc<EnrollmentService>,
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    image: String, // Base64 encoded
}

#[derive(Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub public_key: String,
    pub encrypted_private_key: String,
    pub encryption_salt: String,
    pub encryption_nonce: String,
    pub kdf_iterations: u32,
    /// Flat form of the wrapped key, hex encoded.
    pub wrapped_key: String,
}

#[derive(Deserialize)]
struct VerifyRequest {
    email: String,
    image: String, // Base64 encoded
}

#[derive(Serialize, Deserialize)]
pub struct VerifyResponse {
    pub message: String,
    pub public_key: String,
    pub distance: f64,
}

#[derive(Deserialize)]
struct RecoverRequest {
    email: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct RecoverResponse {
    pub private_key: String,
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Core(Error),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::AlreadyRegistered(_) => StatusCode::CONFLICT,
        Error::NotRegistered(_) => StatusCode::NOT_FOUND,
        Error::BiometricMismatch | Error::WrongPasswordOrCorrupted => StatusCode::UNAUTHORIZED,
        Error::DimensionMismatch { .. }
        | Error::InvalidFeature(_)
        | Error::UnreadableImage(_)
        | Error::NoSubjectDetected => StatusCode::UNPROCESSABLE_ENTITY,
        Error::AuthorityUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        Error::Storage(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: "bad_request".to_string(),
                    message,
                },
            ),
            ApiError::Core(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    error!(error = %err, "request failed");
                }
                (
                    status,
                    ErrorResponse {
                        error: err.kind().to_string(),
                        message: err.to_string(),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/register", post(register))
        .route("/verify", post(verify))
        .route("/recover", post(recover))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, label) = if state.enrollment.authority_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "authority_unavailable")
    };
    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

fn decode_image(encoded: &str) -> Result<Vec<u8>, ApiError> {
    STANDARD
        .decode(encoded)
        .map_err(|e| ApiError::BadRequest(format!("image is not valid base64: {e}")))
}

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    info!("Registration request: email={}", request.email);

    let image = decode_image(&request.image)?;
    let receipt = state
        .enrollment
        .enroll_image(&request.email, &image, &request.password)
        .await?;

    let wrapped = &receipt.wrapped_private_key;
    Ok(Json(RegisterResponse {
        message: "Registration successful.".to_string(),
        public_key: receipt.public_key.to_pem(),
        encrypted_private_key: hex::encode(&wrapped.ciphertext),
        encryption_salt: hex::encode(wrapped.salt),
        encryption_nonce: hex::encode(wrapped.nonce),
        kdf_iterations: wrapped.iterations,
        wrapped_key: wrapped.to_hex(),
    }))
}

async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    info!("Verification request: email={}", request.email);

    let image = decode_image(&request.image)?;
    let verification = state
        .enrollment
        .verify_image(&request.email, &image)
        .await?;

    Ok(Json(VerifyResponse {
        message: "Image verified successfully.".to_string(),
        public_key: verification.public_key.to_pem(),
        distance: verification.distance,
    }))
}

async fn recover(
    State(state): State<AppState>,
    Json(request): Json<RecoverRequest>,
) -> Result<Json<RecoverResponse>, ApiError> {
    info!("Key recovery request: email={}", request.email);

    let key = state
        .enrollment
        .recover_private_key(&request.email, &request.password)
        .await?;

    Ok(Json(RecoverResponse {
        private_key: key.to_pem().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&Error::AlreadyRegistered("a".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&Error::NotRegistered("a".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::WrongPasswordOrCorrupted),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&Error::BiometricMismatch),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&Error::NoSubjectDetected),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&Error::AuthorityUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&Error::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_decode_image_rejects_bad_base64() {
        assert!(matches!(
            decode_image("***"),
            Err(ApiError::BadRequest(_))
        ));
        assert_eq!(decode_image("AAEC").unwrap(), vec![0, 1, 2]);
    }
}
