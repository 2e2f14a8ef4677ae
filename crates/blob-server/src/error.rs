use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use blob_manifest::ManifestError;
use blob_store::StoreError;
use blob_types::PathError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("authorization denied: {action} for {identity}")]
    AuthorizationDenied { identity: String, action: String },

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status this error is reported as.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidPath(_) | Self::UnsupportedMethod(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            Self::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
            Self::Manifest(_)
            | Self::Store(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors become a bare status code; detail stays in the logs.
impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        self.status().into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
