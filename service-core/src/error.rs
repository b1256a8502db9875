use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::response::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Authentication error: {0}")]
    AuthError(anyhow::Error),

    #[error("Account not verified: {email}")]
    UnverifiedAccount { email: String },

    #[error("Invalid code: {0}")]
    InvalidCode(String),

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("No identity provider available")]
    NoProviderAvailable,

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    /// Stable machine code carried in the failure envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::AuthError(_) => "INVALID_CREDENTIALS",
            AppError::UnverifiedAccount { .. } => "ACCOUNT_UNVERIFIED",
            AppError::InvalidCode(_) => "INVALID_CODE",
            AppError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::TooManyRequests(_, _) => "RATE_LIMITED",
            AppError::InternalError(_) => "INTERNAL_ERROR",
            AppError::NoProviderAvailable => "NO_PROVIDER_AVAILABLE",
            AppError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            AppError::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            AppError::DatabaseError(_) => "INTERNAL_ERROR",
            AppError::ConfigError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::BadRequest(_) | AppError::InvalidCode(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) | AppError::AuthError(_) | AppError::InvalidRefreshToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) | AppError::UnverifiedAccount { .. } => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(_, _) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_)
            | AppError::NoProviderAvailable
            | AppError::DatabaseError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Internal classes log the cause and render a generic message; nothing
        // implementation-specific reaches the body.
        let (message, details, retry_after) = match &self {
            AppError::ValidationError(err) => (err.to_string(), None, None),
            AppError::BadRequest(err) => (err.to_string(), None, None),
            AppError::NotFound(err) => (err.to_string(), None, None),
            AppError::Unauthorized(err) => (err.to_string(), None, None),
            AppError::Forbidden(err) => (err.to_string(), None, None),
            AppError::AuthError(err) => (err.to_string(), None, None),
            AppError::UnverifiedAccount { email } => (
                "Account is not verified. Please confirm your email first.".to_string(),
                Some(json!({ "requiresVerification": true, "email": email })),
                None,
            ),
            AppError::InvalidCode(msg) => (msg.clone(), None, None),
            AppError::InvalidRefreshToken => (
                "Invalid or expired refresh token. Please sign in again.".to_string(),
                None,
                None,
            ),
            AppError::Conflict(err) => (err.to_string(), None, None),
            AppError::TooManyRequests(msg, retry) => (msg.clone(), None, *retry),
            AppError::NoProviderAvailable => {
                tracing::error!("No identity provider available to serve the request");
                (
                    "Authentication is temporarily unavailable. Please try again later."
                        .to_string(),
                    None,
                    None,
                )
            }
            AppError::ProviderUnavailable(detail) => {
                tracing::warn!(detail = %detail, "Upstream provider unavailable");
                (
                    "Upstream provider is unavailable. Please try again later.".to_string(),
                    None,
                    None,
                )
            }
            AppError::ServiceUnavailable => ("Service unavailable".to_string(), None, None),
            AppError::InternalError(err) => {
                tracing::error!(error = %err, "Internal error");
                ("Internal server error".to_string(), None, None)
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                ("Internal server error".to_string(), None, None)
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                ("Internal server error".to_string(), None, None)
            }
        };

        let body = ApiResponse::failure(code, message, details);
        let mut res = (status, body).into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}
