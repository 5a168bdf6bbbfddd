//! Error types for web handlers.
//!
//! Ticket protocol outcomes (sold out, no reservation, ...) are ordinary
//! responses produced by the sale system. `AppError` covers what goes wrong
//! around it: unknown endpoints, unsupported methods, lost answers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

/// Failures of the HTTP adapter itself.
///
/// Rendered as a JSON body with a stable error code.
#[derive(Error, Debug)]
pub enum AppError {
    /// No API endpoint at this path.
    #[error("No endpoint at {0}")]
    UnknownEndpoint(String),

    /// The method is neither GET nor POST.
    #[error("Method {0} is not supported")]
    MethodNotAllowed(String),

    /// The request was dropped inside the sale system without an answer.
    #[error("Request dropped without a response")]
    Dropped(#[source] RecvError),

    /// `/metrics` was scraped but no recorder is installed.
    #[error("Metrics recorder not installed")]
    MetricsUnavailable,

    /// Anything else.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status code
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::UnknownEndpoint(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::MetricsUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Dropped(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code for clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownEndpoint(_) => "NOT_FOUND",
            Self::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            Self::Dropped(_) => "REQUEST_DROPPED",
            Self::MetricsUnavailable => "METRICS_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl From<RecvError> for AppError {
    fn from(error: RecvError) -> Self {
        Self::Dropped(error)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, code = self.code(), error = ?self, "Request failed");
        }

        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
