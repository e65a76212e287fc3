//! Error taxonomy for the training service.
//!
//! Configuration/validation errors surface at the request boundary through
//! [`AppError::status_code`]; per-step computation errors are logged and
//! degraded locally by their call sites and never reach this type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("episode not found: {0}")]
    NotFound(String),

    #[error("unknown shape: {0}")]
    BadShape(String),

    #[error("geometry condition not satisfied: 4*n*r_avoid^2 > shape_cells*l_cell^2")]
    GeometryInfeasible,

    #[error("LLM provider unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM response could not be parsed: {0}")]
    LlmMalformed(String),

    #[error("LLM response rejected: {0}")]
    LlmRejected(String),

    #[error("prior document failed structural validation: {0}")]
    SchemaViolation(String),

    #[error("reward formula contained a disallowed construct: {0}")]
    ExprRejected(String),

    #[error("replay buffer sampled before warmup: have {have}, need {need}")]
    BufferUnderfilled { have: usize, need: usize },

    #[error("operation error: {0}")]
    OperationError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadShape(_) => StatusCode::BAD_REQUEST,
            AppError::GeometryInfeasible => StatusCode::BAD_REQUEST,
            AppError::LlmUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::LlmMalformed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::LlmRejected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::SchemaViolation(_) => StatusCode::BAD_REQUEST,
            AppError::ExprRejected(_) => StatusCode::BAD_REQUEST,
            AppError::BufferUnderfilled { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::OperationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-stable tag used in the JSON error body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NotFound",
            AppError::BadShape(_) => "BadShape",
            AppError::GeometryInfeasible => "GeometryInfeasible",
            AppError::LlmUnavailable(_) => "LLMUnavailable",
            AppError::LlmMalformed(_) => "LLMMalformed",
            AppError::LlmRejected(_) => "LLMRejected",
            AppError::SchemaViolation(_) => "SchemaViolation",
            AppError::ExprRejected(_) => "ExprRejected",
            AppError::BufferUnderfilled { .. } => "BufferUnderfilled",
            AppError::OperationError(_) => "OperationError",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.kind().to_string(),
            detail: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
