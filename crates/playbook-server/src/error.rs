use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use playbook_core::error::AnalyticsError;

use crate::client::FetchError;
use crate::refresher::RefreshError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 errors
// ---------------------------------------------------------------------------

/// Carries a 400 for malformed query parameters that have no
/// `AnalyticsError` counterpart (bad timestamps, inverted flags).
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<BadRequestError>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        if let Some(e) = self.0.downcast_ref::<RefreshError>() {
            return match e {
                RefreshError::NoSnapshot => StatusCode::SERVICE_UNAVAILABLE,
                RefreshError::Superseded { .. } => StatusCode::CONFLICT,
                RefreshError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }
        if self.0.downcast_ref::<FetchError>().is_some() {
            return StatusCode::SERVICE_UNAVAILABLE;
        }
        match self.0.downcast_ref::<AnalyticsError>() {
            Some(e) => match e {
                AnalyticsError::NotInitialized
                | AnalyticsError::UnknownMetric(_)
                | AnalyticsError::UnknownSegment(_)
                | AnalyticsError::UnknownChannel(_)
                | AnalyticsError::UnknownStatus(_)
                | AnalyticsError::UnknownGoal(_)
                | AnalyticsError::InvalidRange(_) => StatusCode::BAD_REQUEST,
                AnalyticsError::PlaybookNotFound(_) | AnalyticsError::RunNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                AnalyticsError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                AnalyticsError::Io(_) | AnalyticsError::Yaml(_) | AnalyticsError::Json(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
