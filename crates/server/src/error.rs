//! Mapping of service errors onto HTTP responses

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use carelink_shared::HealthError;
use chrono::{DateTime, Utc};
use health_validation::ValidationError;
use serde::Serialize;

pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned by every handler; renders the failure envelope
#[derive(Debug)]
pub struct ApiError(pub HealthError);

/// `{success: false, message, error, errors, timestamp}`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub error: &'static str,
    pub errors: Vec<ValidationError>,
    pub timestamp: DateTime<Utc>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        status_for(&self.0)
    }
}

pub fn status_for(error: &HealthError) -> StatusCode {
    match error {
        HealthError::Validation { .. } => StatusCode::BAD_REQUEST,
        HealthError::Authentication(_) => StatusCode::UNAUTHORIZED,
        HealthError::Authorization(_) => StatusCode::FORBIDDEN,
        HealthError::NotFound(_) => StatusCode::NOT_FOUND,
        HealthError::Conflict(_) => StatusCode::CONFLICT,
        HealthError::BusinessRule(_) => StatusCode::UNPROCESSABLE_ENTITY,
        HealthError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        HealthError::Database(_) | HealthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<HealthError> for ApiError {
    fn from(err: HealthError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(HealthError::validation(format!("Invalid request body: {}", rejection.body_text())))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(HealthError::validation(format!("Invalid query string: {}", rejection.body_text())))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(HealthError::validation(format!("Invalid path parameter: {}", rejection.body_text())))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.0.kind();

        let (message, errors) = match self.0 {
            HealthError::Validation { message, errors } => (message, errors),
            HealthError::Database(err) => {
                tracing::error!(error = ?err, "database failure while handling request");
                ("An unexpected error occurred".to_string(), Vec::new())
            }
            HealthError::Internal(detail) => {
                tracing::error!(%detail, "internal failure while handling request");
                ("An unexpected error occurred".to_string(), Vec::new())
            }
            other => (other.to_string(), Vec::new()),
        };

        let body = ErrorBody {
            success: false,
            message,
            error,
            errors,
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}
