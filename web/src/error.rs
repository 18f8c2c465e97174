//! HTTP error responses.
//!
//! [`AppError`] bridges [`EnrollmentError`] and HTTP responses: a status, a
//! stable machine-readable code and a user-safe message. Internal details are
//! kept as the source for logging only.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use enrollment_core::EnrollmentError;
use serde::Serialize;
use std::fmt;

/// Error returned by every handler, rendered as `{code, message}` JSON.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<View>, AppError> {
///     let reservation = state.engine.find_reservation(&number).await?;
///     Ok(Json(View::from(reservation)))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    /// Safe to show to the caller
    message: String,
    /// Stable identifier clients can branch on
    code: &'static str,
    /// Logged on 5xx, never serialized
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Error with an explicit status and code.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: &'static str) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status of this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code of this error
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// 400, `BAD_REQUEST`
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST")
    }

    /// 404, `NOT_FOUND`
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message.into(), "NOT_FOUND")
    }

    /// 409 with a caller-chosen code
    #[must_use]
    pub fn conflict(message: impl Into<String>, code: &'static str) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), code)
    }

    /// 422, `VALIDATION_ERROR`
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            "VALIDATION_ERROR",
        )
    }

    /// 502, `PAYMENT_GATEWAY_ERROR`
    #[must_use]
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message.into(), "PAYMENT_GATEWAY_ERROR")
    }

    /// 500, `INTERNAL_SERVER_ERROR`
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR",
        )
    }

    /// 503, `SERVICE_UNAVAILABLE`
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE",
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let source: &(dyn std::error::Error + 'static) = self.source.as_ref()?.as_ref();
        Some(source)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            let cause = self.source.as_ref().map(|e| format!("{e:#}"));
            tracing::error!(
                status = %self.status,
                code = self.code,
                message = %self.message,
                cause = cause.as_deref().unwrap_or("none"),
                "Request failed"
            );
        }

        let status = self.status;
        let body = ErrorBody {
            code: self.code,
            message: self.message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<EnrollmentError> for AppError {
    fn from(err: EnrollmentError) -> Self {
        match err {
            EnrollmentError::NotFound { .. } => Self::not_found(err.to_string()),
            EnrollmentError::DuplicateResource(_) => Self::conflict(
                "An enrollment for this email already exists",
                "DUPLICATE_ENROLLMENT",
            ),
            EnrollmentError::EventSoldOut(_) => {
                Self::conflict("The event is sold out", "EVENT_SOLD_OUT")
            }
            EnrollmentError::Validation(message) => Self::validation(message),
            EnrollmentError::InvalidWebhookSignature => {
                Self::new(StatusCode::BAD_REQUEST, err.to_string(), "INVALID_SIGNATURE")
            }
            EnrollmentError::ExternalServiceFailure(_) => {
                Self::bad_gateway("Payment provider unavailable, please retry")
                    .with_source(anyhow::Error::new(err))
            }
            EnrollmentError::Store(_) => {
                Self::internal("Something went wrong on our side")
                    .with_source(anyhow::Error::new(err))
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("Something went wrong on our side").with_source(err)
    }
}
