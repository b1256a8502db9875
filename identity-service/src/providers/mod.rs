//! Identity provider abstraction.
//!
//! Every provider is driven through [`ProviderCapability`]; vendor wire formats
//! and vendor error identifiers stay inside the adapter implementations and are
//! classified into [`ProviderErrorKind`] at that boundary.

mod cognito;
mod firebase;
mod jwks;
mod mock;
mod registry;

pub use cognito::CognitoProvider;
pub use firebase::FirebaseProvider;
pub use mock::MockProvider;
pub use registry::{ProviderRegistry, RegisteredProviders};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Supported identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Cognito,
    Firebase,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Cognito => "cognito",
            AuthProvider::Firebase => "firebase",
        }
    }

    /// The counterpart provider in a two-provider deployment.
    pub fn other(&self) -> AuthProvider {
        match self {
            AuthProvider::Cognito => AuthProvider::Firebase,
            AuthProvider::Firebase => AuthProvider::Cognito,
        }
    }
}

impl std::str::FromStr for AuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cognito" => Ok(AuthProvider::Cognito),
            "firebase" => Ok(AuthProvider::Firebase),
            _ => Err(format!("Invalid auth provider: {}", s)),
        }
    }
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure classes a provider adapter can report.
///
/// Adapters translate vendor identifiers into exactly one of these; all
/// downstream policy (fallback, fail-fast, surfacing) dispatches on the kind
/// and never on vendor strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The email has no account at this provider.
    IdentityNotFound,
    /// The account exists but has not confirmed its contact address.
    NotConfirmed,
    /// The credentials were rejected.
    BadCredentials,
    /// An account with this email already exists at the provider.
    AlreadyExists,
    /// Confirmation / reset code was wrong or expired.
    CodeInvalid,
    /// The provider rejected the request as malformed (weak password, bad
    /// parameter).
    Rejected,
    /// Throttling or a provider-side outage; safe to try the other provider.
    Transient,
    /// Anything the adapter could not classify.
    Other,
}

/// Error reported by a provider adapter, classified at the vendor boundary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{provider} provider error ({kind:?}): {message}")]
pub struct ProviderError {
    pub provider: AuthProvider,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: AuthProvider, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ProviderErrorKind::Transient
    }
}

/// Identity attributes asserted by a provider after verification or sign-in.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub subject: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Role claim forwarded by the provider, if any ("client", "therapist", ..).
    pub role_hint: Option<String>,
    pub email_verified: bool,
}

/// Outcome of id-token verification.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub identity: ProviderIdentity,
    pub expires_at: DateTime<Utc>,
}

/// Opaque session tokens minted by a provider.
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: String,
}

impl ProviderTokens {
    pub fn bearer(
        access_token: String,
        id_token: Option<String>,
        refresh_token: Option<String>,
        expires_in: i64,
    ) -> Self {
        Self {
            access_token,
            id_token,
            refresh_token,
            expires_in,
            token_type: "Bearer".to_string(),
        }
    }
}

/// Normalized result of a successful authentication: who the provider says the
/// caller is, plus the session tokens it minted. Consumed immediately by
/// reconciliation; never persisted.
#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub identity: ProviderIdentity,
    pub tokens: ProviderTokens,
}

/// Attributes forwarded to the provider on sign-up.
#[derive(Debug, Clone)]
pub struct SignUpAttributes {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub role: String,
}

/// Receipt returned by a provider sign-up.
#[derive(Debug, Clone)]
pub struct SignUpReceipt {
    pub subject: String,
    pub confirmation_required: bool,
}

/// Capability contract every identity provider satisfies.
///
/// Stateless per call; implementations own their HTTP client and timeout.
#[async_trait]
pub trait ProviderCapability: Send + Sync {
    fn kind(&self) -> AuthProvider;

    /// Verify a provider-issued id token and return the identity it asserts.
    async fn verify_token(&self, id_token: &str) -> Result<VerifiedToken, ProviderError>;

    /// Password sign-in.
    async fn sign_in(&self, email: &str, password: &str)
        -> Result<ProviderSession, ProviderError>;

    /// Create the account at the provider.
    async fn sign_up(&self, attrs: &SignUpAttributes) -> Result<SignUpReceipt, ProviderError>;

    /// Confirm a sign-up with the emailed code.
    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<(), ProviderError>;

    /// Re-send the sign-up confirmation code.
    async fn resend_confirmation_code(&self, email: &str) -> Result<(), ProviderError>;

    /// Start the password reset flow.
    async fn forgot_password(&self, email: &str) -> Result<(), ProviderError>;

    /// Complete the password reset flow with the emailed code.
    async fn confirm_forgot_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), ProviderError>;

    /// Exchange a refresh token for fresh session tokens.
    async fn refresh_token(&self, refresh_token: &str) -> Result<ProviderTokens, ProviderError>;
}
