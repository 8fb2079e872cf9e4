use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use vdesk_broker::BrokerError;
use vdesk_core::error::CoreError;
use vdesk_provider::ProviderError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`BrokerError`] for domain errors and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce
/// consistent JSON error responses. Error codes distinguish "try again"
/// conditions (`PROVIDER_UNAVAILABLE`, `START_TIMEOUT`) from "fix
/// something" conditions (`MFA_REQUIRED`, `VALIDATION_ERROR`).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `vdesk_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An orchestration error from `vdesk_broker`.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),

            AppError::Broker(broker) => match broker {
                BrokerError::Core(core) => classify_core_error(core),
                BrokerError::Provider(provider) => classify_provider_error(provider),
                BrokerError::Database(err) => {
                    tracing::error!(error = %err, "Database error");
                    internal()
                }
                BrokerError::StartTimeout(bound) => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "START_TIMEOUT",
                    format!("Desktop did not become ready within {bound:?}; try again"),
                ),
                BrokerError::TransportFailure(msg) => {
                    tracing::error!(error = %msg, "Transport failure");
                    (
                        StatusCode::BAD_GATEWAY,
                        "TRANSPORT_FAILURE",
                        "Could not establish the session tunnel; try again".to_string(),
                    )
                }
            },

            AppError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                internal()
            }

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::MfaRequired => (
            StatusCode::UNAUTHORIZED,
            "MFA_REQUIRED",
            "An MFA code is required".to_string(),
        ),
        CoreError::MfaInvalid => (
            StatusCode::UNAUTHORIZED,
            "MFA_INVALID",
            "The MFA code is invalid".to_string(),
        ),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

fn classify_provider_error(provider: &ProviderError) -> (StatusCode, &'static str, String) {
    match provider {
        ProviderError::Unavailable(_) | ProviderError::Timeout(_) | ProviderError::Cancelled => (
            StatusCode::SERVICE_UNAVAILABLE,
            "PROVIDER_UNAVAILABLE",
            "The cloud provider is temporarily unavailable; try again".to_string(),
        ),
        ProviderError::Rejected(msg) => {
            tracing::error!(error = %msg, "Provider rejected a request");
            (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_REJECTED",
                "The cloud provider rejected the request".to_string(),
            )
        }
        ProviderError::Auth(msg) => {
            tracing::error!(error = %msg, "Provider authentication failed");
            (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_AUTH",
                "Provider credentials are misconfigured".to_string(),
            )
        }
    }
}
