//! Domain error taxonomy for the hub, one enum per concern per the
//! error handling design: protocol/reassembly failures never crash the
//! process, only storage and startup failures are treated as fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReassemblyError {
    #[error("session {node_hash:04x}:{session_id} timed out with {received}/{expected:?} chunks")]
    SessionTimeout {
        node_hash: u16,
        session_id: u16,
        received: usize,
        expected: Option<u8>,
    },
    #[error("session {node_hash:04x}:{session_id} overwritten before completion")]
    SessionOverwritten { node_hash: u16, session_id: u16 },
    #[error("payload length mismatch: expected {expected}, assembled {actual}")]
    PayloadLengthMismatch { expected: usize, actual: usize },
    #[error("failed to decode assembled payload: {0}")]
    DecodeFailed(#[from] wire::CodecError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("deep classifier rate limit exceeded")]
    RateLimited,
    #[error("classifier tier unreachable")]
    Unreachable,
    #[error("classifier returned an unsupported or malformed response")]
    BadResponse,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("record not found")]
    NotFound,
}

/// Top-level error for the axum surface; maps domain errors to status codes
/// at the boundary rather than leaking `sqlx`/`reqwest` types to clients.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl axum::response::IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let (status, message) = match &self {
            HttpError::Store(StoreError::NotFound) => (StatusCode::NOT_FOUND, self.to_string()),
            HttpError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            HttpError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        };
        (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
    }
}
