// src/error.rs
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::message::ErrorBody;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Failure reported by the upstream generative model.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("upstream rate limit exceeded")]
    RateLimited,

    #[error("request blocked by upstream: {0}")]
    Blocked(String),

    #[error("timed out waiting for upstream after {0:?}")]
    Timeout(std::time::Duration),

    #[error("could not decode upstream response: {0}")]
    Decode(String),

    #[error("invalid response from model: {0}")]
    InvalidResponse(String),

    #[error("stream cancelled before completion")]
    Cancelled,
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            UpstreamError::Decode(e.to_string())
        } else {
            UpstreamError::Network(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    /// Body refused during extraction (400, 415 or 422); never reaches upstream.
    Rejected { status: StatusCode, message: String },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Rejected { status, message } => {
                tracing::warn!(%status, "rejected request: {message}");
                (status, message)
            }
            AppError::Upstream(e) => {
                tracing::error!(error = %e, "upstream call failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "upstream model request failed".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
