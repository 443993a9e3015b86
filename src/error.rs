//! This module is about classifying failures into the HTTP statuses and JSON bodies returned to API consumers.

use crate::query::{BuildError, UnknownDataType};
use crate::wcl::QueryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error enumeration for everything that can make a proxied request fail.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request was missing something, or had something unparseable.
    #[error("{0}")]
    BadRequest(String),
    /// No route matched.
    #[error("Route not found: {method} {path}")]
    NotFound { method: String, path: String },
    /// Talking to Warcraft Logs failed.
    #[error(transparent)]
    Upstream(#[from] QueryError),
}

impl From<BuildError> for ApiError {
    fn from(e: BuildError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<UnknownDataType> for ApiError {
    fn from(e: UnknownDataType) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

/// The `error` member of a failure envelope.
#[derive(Debug, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// The body of every failed response.
#[derive(Debug, Serialize)]
struct FailureEnvelope {
    success: bool,
    error: ErrorDetail,
}

impl ApiError {
    /// The status to answer with: the upstream status for rejected queries, `500` for other upstream failures.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Upstream(QueryError::Query { status, .. }) if *status >= 400 => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Describe the error, with its internals only when `diagnostics` is on.
    pub fn detail(&self, diagnostics: bool) -> ErrorDetail {
        ErrorDetail {
            message: self.to_string(),
            stack: diagnostics.then(|| format!("{:#?}", self)),
        }
    }

    /// Render the failure envelope.
    pub fn into_response_with(self, diagnostics: bool) -> Response {
        let status = self.status();
        match status.is_server_error() {
            true => error!("Request failed: {}", &self),
            false => debug!("Request rejected: {}", &self),
        }
        let body = FailureEnvelope { success: false, error: self.detail(diagnostics) };
        (status, Json(body)).into_response()
    }
}
