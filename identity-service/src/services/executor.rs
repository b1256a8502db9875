//! Auth operation execution with deterministic fallback.
//!
//! Every provider call a request makes goes through here. The retry policy is
//! an explicit three-step chain per operation: attempt the resolved provider,
//! attempt the other registered provider when the policy allows it, then
//! exhaust. At exhaustion the password flow surfaces the first attempt's
//! error, which keeps the failure a caller sees stable regardless of what the
//! retry happened to return.

use std::sync::Arc;

use chrono::Utc;

use super::error::ServiceError;
use super::metrics::{PROVIDER_FALLBACKS_TOTAL, PROVIDER_REQUESTS_TOTAL};
use super::resolver::ResolvedProvider;
use crate::providers::{
    AuthProvider, ProviderError, ProviderErrorKind, ProviderRegistry, ProviderSession,
    ProviderTokens, SignUpAttributes, SignUpReceipt, VerifiedToken,
};

/// A completed authentication: the session plus the provider that actually
/// produced it, which is what reconciliation attributes the login to.
#[derive(Debug)]
pub struct ExecutedAuth {
    pub session: ProviderSession,
    pub used: AuthProvider,
}

pub struct AuthOperationExecutor {
    registry: Arc<ProviderRegistry>,
}

impl AuthOperationExecutor {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Password sign-in.
    ///
    /// Retries against the other provider only when the resolved one does not
    /// know the email and universal fallback is enabled; that retry is the
    /// migration escape hatch for users who exist only in the other pool. An
    /// unconfirmed account fails fast, and every other failure propagates
    /// from the first attempt.
    pub async fn sign_in(
        &self,
        resolved: &ResolvedProvider,
        email: &str,
        password: &str,
    ) -> Result<ExecutedAuth, ServiceError> {
        let first = resolved.provider.sign_in(email, password).await;
        self.observe(resolved.kind, "sign_in", first.is_ok());

        let original = match first {
            Ok(session) => {
                return Ok(ExecutedAuth {
                    session,
                    used: resolved.kind,
                })
            }
            Err(e) => e,
        };

        match original.kind {
            // The account exists at this provider; no other provider can do
            // better, and the caller needs the verification hint.
            ProviderErrorKind::NotConfirmed => {}
            ProviderErrorKind::IdentityNotFound if self.registry.universal_fallback() => {
                let other = resolved.kind.other();
                if let Some(provider) = self.registry.get(other) {
                    tracing::info!(
                        from = %resolved.kind,
                        to = %other,
                        "email unknown at resolved provider; retrying sign-in"
                    );
                    PROVIDER_FALLBACKS_TOTAL.with_label_values(&["password"]).inc();

                    let retry = provider.sign_in(email, password).await;
                    self.observe(other, "sign_in", retry.is_ok());
                    match retry {
                        Ok(session) => {
                            return Ok(ExecutedAuth {
                                session,
                                used: other,
                            })
                        }
                        // Exhausted: the surfaced error is the first
                        // attempt's, never the retry's.
                        Err(retry_err) => {
                            tracing::debug!(error = %retry_err, "fallback sign-in failed")
                        }
                    }
                }
            }
            _ => {}
        }

        Err(Self::login_error(original, email))
    }

    /// Token login. The token is self-identifying, so verification is tried
    /// against the resolved provider and then the other registered one
    /// unconditionally; whichever verifier succeeds is the provider the login
    /// is attributed to.
    pub async fn login_with_token(
        &self,
        resolved: &ResolvedProvider,
        id_token: &str,
    ) -> Result<ExecutedAuth, ServiceError> {
        let first = resolved.provider.verify_token(id_token).await;
        self.observe(resolved.kind, "verify_token", first.is_ok());

        let original = match first {
            Ok(verified) => return Ok(Self::token_session(verified, id_token, resolved.kind)),
            Err(e) => e,
        };

        let other = resolved.kind.other();
        if let Some(provider) = self.registry.get(other) {
            tracing::debug!(
                error = %original,
                from = %resolved.kind,
                to = %other,
                "token rejected; trying the other verifier"
            );
            PROVIDER_FALLBACKS_TOTAL.with_label_values(&["token"]).inc();

            let retry = provider.verify_token(id_token).await;
            self.observe(other, "verify_token", retry.is_ok());
            if let Ok(verified) = retry {
                return Ok(Self::token_session(verified, id_token, other));
            }
        }

        Err(ServiceError::InvalidCredentials)
    }

    /// Refresh grant. No email exists to resolve by, so the chain is fixed:
    /// configured primary first, then the other registered provider.
    /// Intermediate failures are expected under failover and logged quietly;
    /// only the exhausted chain surfaces.
    pub async fn refresh(&self, refresh_token: &str) -> Result<ProviderTokens, ServiceError> {
        let primary = self.registry.primary_kind();
        let mut attempts = 0;

        for kind in [primary, primary.other()] {
            let Some(provider) = self.registry.get(kind) else {
                continue;
            };
            if attempts > 0 {
                PROVIDER_FALLBACKS_TOTAL.with_label_values(&["refresh"]).inc();
            }
            attempts += 1;

            let result = provider.refresh_token(refresh_token).await;
            self.observe(kind, "refresh_token", result.is_ok());
            match result {
                Ok(tokens) => return Ok(tokens),
                Err(e) => tracing::debug!(provider = %kind, error = %e, "refresh attempt failed"),
            }
        }

        if attempts == 0 {
            return Err(ServiceError::NoProviderAvailable);
        }
        Err(ServiceError::InvalidRefreshToken)
    }

    pub async fn sign_up(
        &self,
        resolved: &ResolvedProvider,
        attrs: &SignUpAttributes,
    ) -> Result<SignUpReceipt, ServiceError> {
        let result = resolved.provider.sign_up(attrs).await;
        self.observe(resolved.kind, "sign_up", result.is_ok());
        result.map_err(|e| match e.kind {
            ProviderErrorKind::AlreadyExists => ServiceError::EmailAlreadyRegistered,
            ProviderErrorKind::Rejected => ServiceError::Validation(Self::rejection_detail(&e)),
            _ => ServiceError::ProviderUnavailable(e.to_string()),
        })
    }

    pub async fn confirm_sign_up(
        &self,
        resolved: &ResolvedProvider,
        email: &str,
        code: &str,
    ) -> Result<(), ServiceError> {
        let result = resolved.provider.confirm_sign_up(email, code).await;
        self.observe(resolved.kind, "confirm_sign_up", result.is_ok());
        result.map_err(|e| Self::code_error(e))
    }

    pub async fn resend_code(
        &self,
        resolved: &ResolvedProvider,
        email: &str,
    ) -> Result<(), ServiceError> {
        let result = resolved.provider.resend_confirmation_code(email).await;
        self.observe(resolved.kind, "resend_confirmation_code", result.is_ok());
        result.map_err(|e| match e.kind {
            ProviderErrorKind::IdentityNotFound => ServiceError::UserNotFound,
            _ => ServiceError::ProviderUnavailable(e.to_string()),
        })
    }

    pub async fn forgot_password(
        &self,
        resolved: &ResolvedProvider,
        email: &str,
    ) -> Result<(), ServiceError> {
        let result = resolved.provider.forgot_password(email).await;
        self.observe(resolved.kind, "forgot_password", result.is_ok());
        result.map_err(|e| match e.kind {
            ProviderErrorKind::IdentityNotFound => ServiceError::UserNotFound,
            _ => ServiceError::ProviderUnavailable(e.to_string()),
        })
    }

    pub async fn reset_password(
        &self,
        resolved: &ResolvedProvider,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let result = resolved
            .provider
            .confirm_forgot_password(email, code, new_password)
            .await;
        self.observe(resolved.kind, "confirm_forgot_password", result.is_ok());
        result.map_err(|e| Self::code_error(e))
    }

    fn observe(&self, provider: AuthProvider, operation: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        PROVIDER_REQUESTS_TOTAL
            .with_label_values(&[provider.as_str(), operation, outcome])
            .inc();
    }

    fn login_error(e: ProviderError, email: &str) -> ServiceError {
        match e.kind {
            ProviderErrorKind::NotConfirmed => ServiceError::AccountUnverified {
                email: email.to_string(),
            },
            ProviderErrorKind::Transient | ProviderErrorKind::Other => {
                ServiceError::ProviderUnavailable(e.to_string())
            }
            _ => ServiceError::InvalidCredentials,
        }
    }

    /// Shared mapping for code-bearing flows (confirm, password reset).
    /// Whether the code or the address was wrong is not disclosed.
    fn code_error(e: ProviderError) -> ServiceError {
        match e.kind {
            ProviderErrorKind::CodeInvalid
            | ProviderErrorKind::IdentityNotFound
            | ProviderErrorKind::BadCredentials => ServiceError::InvalidCode,
            ProviderErrorKind::AlreadyExists => ServiceError::EmailAlreadyRegistered,
            ProviderErrorKind::Rejected => ServiceError::Validation(Self::rejection_detail(&e)),
            _ => ServiceError::ProviderUnavailable(e.to_string()),
        }
    }

    /// Human half of a classified rejection. The vendor identifier before the
    /// colon stays in the logs only.
    fn rejection_detail(e: &ProviderError) -> String {
        e.message
            .split_once(':')
            .map(|(_, detail)| detail.trim())
            .filter(|detail| !detail.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| "The identity provider rejected the request".to_string())
    }

    fn token_session(verified: VerifiedToken, id_token: &str, used: AuthProvider) -> ExecutedAuth {
        // Token login echoes the caller's token back; this service never mints
        // its own, and a verify-only flow yields no refresh token.
        let expires_in = (verified.expires_at - Utc::now()).num_seconds().max(0);
        ExecutedAuth {
            session: ProviderSession {
                identity: verified.identity,
                tokens: ProviderTokens::bearer(
                    id_token.to_string(),
                    Some(id_token.to_string()),
                    None,
                    expires_in,
                ),
            },
            used,
        }
    }
}
