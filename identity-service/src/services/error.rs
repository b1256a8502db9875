use service_core::error::AppError;
use thiserror::Error;

use super::store::StoreError;

/// Domain errors for identity operations.
///
/// Provider adapters report [`crate::providers::ProviderError`]; the executor
/// maps those into this taxonomy per operation, so by the time an error
/// reaches a handler it carries no vendor detail.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("No identity provider available")]
    NoProviderAvailable,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account not verified")]
    AccountUnverified { email: String },

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Invalid or expired code")]
    InvalidCode,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail | StoreError::DuplicateSubject => {
                ServiceError::EmailAlreadyRegistered
            }
            StoreError::Database(e) => ServiceError::Database(e),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NoProviderAvailable => AppError::NoProviderAvailable,
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid email or password"))
            }
            ServiceError::AccountUnverified { email } => AppError::UnverifiedAccount { email },
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("An account with this email already exists"))
            }
            ServiceError::InvalidCode => {
                AppError::InvalidCode("Invalid or expired verification code".to_string())
            }
            ServiceError::InvalidRefreshToken => AppError::InvalidRefreshToken,
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::ProviderUnavailable(detail) => AppError::ProviderUnavailable(detail),
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn login_failures_render_stable_envelope_codes() {
        let app: AppError = ServiceError::InvalidCredentials.into();
        assert_eq!(app.code(), "INVALID_CREDENTIALS");
        assert_eq!(app.status(), StatusCode::UNAUTHORIZED);

        let app: AppError = ServiceError::AccountUnverified {
            email: "a@b.com".to_string(),
        }
        .into();
        assert_eq!(app.code(), "ACCOUNT_UNVERIFIED");
        assert_eq!(app.status(), StatusCode::FORBIDDEN);

        let app: AppError = ServiceError::NoProviderAvailable.into();
        assert_eq!(app.code(), "NO_PROVIDER_AVAILABLE");
        assert_eq!(app.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn store_conflicts_become_conflicts() {
        let app: AppError = ServiceError::from(StoreError::DuplicateEmail).into();
        assert_eq!(app.code(), "CONFLICT");
        assert_eq!(app.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn code_and_refresh_failures_keep_their_own_codes() {
        let app: AppError = ServiceError::InvalidCode.into();
        assert_eq!(app.code(), "INVALID_CODE");
        assert_eq!(app.status(), StatusCode::BAD_REQUEST);

        let app: AppError = ServiceError::InvalidRefreshToken.into();
        assert_eq!(app.code(), "INVALID_REFRESH_TOKEN");
        assert_eq!(app.status(), StatusCode::UNAUTHORIZED);
    }
}
