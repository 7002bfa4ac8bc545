//! Crate-wide error taxonomy. Component modules define their own narrow
//! error enums and convert into [`CoreError`] at their boundary; HTTP
//! handlers convert [`CoreError`] into a response via [`IntoResponse`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("chain integrity check failed: {0}")]
    Integrity(String),

    #[error("authentication failed")]
    Authentication,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("block id drift: {0}")]
    IdDrift(String),

    #[error("peer unreachable: {0}")]
    Transient(String),

    #[error("fatal state error: {0}")]
    FatalState(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    fn status(&self) -> StatusCode {
        match self {
            CoreError::Configuration(_) | CoreError::FatalState(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CoreError::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Authentication => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Protocol(_) => StatusCode::NOT_ACCEPTABLE,
            CoreError::IdDrift(_) => StatusCode::NOT_ACCEPTABLE,
            CoreError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Database(_) | CoreError::Serde(_) | CoreError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ProblemBody {
    error: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!(error = %self, "request failed");
        (status, Json(ProblemBody { error: self.to_string() })).into_response()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
