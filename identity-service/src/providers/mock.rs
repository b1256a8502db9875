use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{
    AuthProvider, ProviderCapability, ProviderError, ProviderErrorKind, ProviderIdentity,
    ProviderSession, ProviderTokens, SignUpAttributes, SignUpReceipt, VerifiedToken,
};

/// In-memory provider for tests.
///
/// Behaves like a small user pool: accounts can be seeded confirmed or
/// unconfirmed, id and refresh tokens can be issued up front, and a blanket
/// outage can be scripted to force a given error kind from every call. Each
/// trait call is recorded so tests can assert which provider was exercised.
pub struct MockProvider {
    kind: AuthProvider,
    state: Mutex<MockState>,
}

#[derive(Debug, Clone)]
pub struct MockAccount {
    pub email: String,
    pub password: String,
    pub subject: String,
    pub confirmed: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role_hint: Option<String>,
}

#[derive(Default)]
struct MockState {
    accounts: HashMap<String, MockAccount>,
    id_tokens: HashMap<String, ProviderIdentity>,
    refresh_tokens: HashMap<String, String>,
    outage: Option<ProviderErrorKind>,
    calls: Vec<&'static str>,
    minted: u64,
}

impl MockProvider {
    /// Code every seeded account confirms or resets with.
    pub const CONFIRMATION_CODE: &'static str = "123456";

    pub fn new(kind: AuthProvider) -> Self {
        Self {
            kind,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_confirmed_user(&self, email: &str, password: &str) -> String {
        self.seed_account(email, password, true)
    }

    pub fn with_unconfirmed_user(&self, email: &str, password: &str) -> String {
        self.seed_account(email, password, false)
    }

    pub fn with_account(&self, account: MockAccount) {
        let mut state = self.guard();
        state.accounts.insert(account.email.to_lowercase(), account);
    }

    /// Register an id token the provider will accept for verification.
    pub fn issue_id_token(&self, token: &str, identity: ProviderIdentity) {
        let mut state = self.guard();
        state.id_tokens.insert(token.to_string(), identity);
    }

    /// Register a refresh token the provider will exchange for fresh tokens.
    pub fn grant_refresh(&self, token: &str, subject: &str) {
        let mut state = self.guard();
        state
            .refresh_tokens
            .insert(token.to_string(), subject.to_string());
    }

    /// Force every subsequent call to fail with the given kind.
    pub fn set_outage(&self, kind: Option<ProviderErrorKind>) {
        self.guard().outage = kind;
    }

    pub fn subject_of(&self, email: &str) -> Option<String> {
        let state = self.guard();
        state
            .accounts
            .get(&email.to_lowercase())
            .map(|a| a.subject.clone())
    }

    pub fn is_confirmed(&self, email: &str) -> Option<bool> {
        let state = self.guard();
        state.accounts.get(&email.to_lowercase()).map(|a| a.confirmed)
    }

    pub fn password_of(&self, email: &str) -> Option<String> {
        let state = self.guard();
        state
            .accounts
            .get(&email.to_lowercase())
            .map(|a| a.password.clone())
    }

    pub fn call_count(&self, op: &str) -> usize {
        let state = self.guard();
        state.calls.iter().filter(|c| **c == op).count()
    }

    fn seed_account(&self, email: &str, password: &str, confirmed: bool) -> String {
        let subject = self.mint(&format!("{}-sub", self.kind));
        self.with_account(MockAccount {
            email: email.to_string(),
            password: password.to_string(),
            subject: subject.clone(),
            confirmed,
            first_name: Some("Test".to_string()),
            last_name: Some("User".to_string()),
            role_hint: None,
        });
        subject
    }

    fn mint(&self, prefix: &str) -> String {
        let mut state = self.guard();
        state.minted += 1;
        format!("{}-{}", prefix, state.minted)
    }

    fn guard(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock provider state poisoned")
    }

    fn begin(&self, op: &'static str) -> Result<(), ProviderError> {
        let mut state = self.guard();
        state.calls.push(op);
        match state.outage {
            Some(kind) => Err(self.err(kind, "scripted outage")),
            None => Ok(()),
        }
    }

    fn err(&self, kind: ProviderErrorKind, message: &str) -> ProviderError {
        ProviderError::new(self.kind, kind, message)
    }

    fn identity_of(account: &MockAccount) -> ProviderIdentity {
        ProviderIdentity {
            subject: account.subject.clone(),
            email: account.email.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            role_hint: account.role_hint.clone(),
            email_verified: account.confirmed,
        }
    }

    fn mint_tokens(&self, subject: &str) -> ProviderTokens {
        let serial = self.mint(&format!("{}-token", self.kind));
        let refresh = format!("{}-refresh", serial);
        {
            let mut state = self.guard();
            state.refresh_tokens.insert(refresh.clone(), subject.to_string());
        }
        ProviderTokens::bearer(
            format!("{}-access", serial),
            Some(format!("{}-id", serial)),
            Some(refresh),
            3600,
        )
    }
}

#[async_trait]
impl ProviderCapability for MockProvider {
    fn kind(&self) -> AuthProvider {
        self.kind
    }

    async fn verify_token(&self, id_token: &str) -> Result<VerifiedToken, ProviderError> {
        self.begin("verify_token")?;
        let state = self.guard();
        match state.id_tokens.get(id_token) {
            Some(identity) => Ok(VerifiedToken {
                identity: identity.clone(),
                expires_at: Utc::now() + Duration::hours(1),
            }),
            None => Err(self.err(ProviderErrorKind::BadCredentials, "unrecognized token")),
        }
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, ProviderError> {
        self.begin("sign_in")?;
        let account = {
            let state = self.guard();
            state.accounts.get(&email.to_lowercase()).cloned()
        };
        let Some(account) = account else {
            return Err(self.err(ProviderErrorKind::IdentityNotFound, "user not found"));
        };
        if !account.confirmed {
            return Err(self.err(ProviderErrorKind::NotConfirmed, "account not confirmed"));
        }
        if account.password != password {
            return Err(self.err(ProviderErrorKind::BadCredentials, "wrong password"));
        }
        Ok(ProviderSession {
            identity: Self::identity_of(&account),
            tokens: self.mint_tokens(&account.subject),
        })
    }

    async fn sign_up(&self, attrs: &SignUpAttributes) -> Result<SignUpReceipt, ProviderError> {
        self.begin("sign_up")?;
        if self.guard().accounts.contains_key(&attrs.email.to_lowercase()) {
            return Err(self.err(ProviderErrorKind::AlreadyExists, "email already registered"));
        }
        let subject = self.mint(&format!("{}-sub", self.kind));
        self.with_account(MockAccount {
            email: attrs.email.clone(),
            password: attrs.password.clone(),
            subject: subject.clone(),
            confirmed: false,
            first_name: Some(attrs.first_name.clone()),
            last_name: Some(attrs.last_name.clone()),
            role_hint: Some(attrs.role.clone()),
        });
        Ok(SignUpReceipt {
            subject,
            confirmation_required: true,
        })
    }

    async fn confirm_sign_up(&self, email: &str, code: &str) -> Result<(), ProviderError> {
        self.begin("confirm_sign_up")?;
        let mut state = self.guard();
        let Some(account) = state.accounts.get_mut(&email.to_lowercase()) else {
            return Err(self.err(ProviderErrorKind::IdentityNotFound, "user not found"));
        };
        if code != Self::CONFIRMATION_CODE {
            return Err(self.err(ProviderErrorKind::CodeInvalid, "wrong code"));
        }
        account.confirmed = true;
        Ok(())
    }

    async fn resend_confirmation_code(&self, email: &str) -> Result<(), ProviderError> {
        self.begin("resend_confirmation_code")?;
        let state = self.guard();
        if !state.accounts.contains_key(&email.to_lowercase()) {
            return Err(self.err(ProviderErrorKind::IdentityNotFound, "user not found"));
        }
        Ok(())
    }

    async fn forgot_password(&self, email: &str) -> Result<(), ProviderError> {
        self.begin("forgot_password")?;
        let state = self.guard();
        if !state.accounts.contains_key(&email.to_lowercase()) {
            return Err(self.err(ProviderErrorKind::IdentityNotFound, "user not found"));
        }
        Ok(())
    }

    async fn confirm_forgot_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), ProviderError> {
        self.begin("confirm_forgot_password")?;
        let mut state = self.guard();
        let Some(account) = state.accounts.get_mut(&email.to_lowercase()) else {
            return Err(self.err(ProviderErrorKind::IdentityNotFound, "user not found"));
        };
        if code != Self::CONFIRMATION_CODE {
            return Err(self.err(ProviderErrorKind::CodeInvalid, "wrong code"));
        }
        account.password = new_password.to_string();
        Ok(())
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<ProviderTokens, ProviderError> {
        self.begin("refresh_token")?;
        let subject = {
            let state = self.guard();
            state.refresh_tokens.get(refresh_token).cloned()
        };
        match subject {
            Some(subject) => Ok(self.mint_tokens(&subject)),
            None => Err(self.err(
                ProviderErrorKind::BadCredentials,
                "unrecognized refresh token",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_account_signs_in_and_refreshes() {
        let mock = MockProvider::new(AuthProvider::Cognito);
        mock.with_confirmed_user("a@example.com", "pw");

        let session = mock.sign_in("A@Example.com", "pw").await.unwrap();
        assert_eq!(session.identity.email, "a@example.com");

        let refresh = session.tokens.refresh_token.unwrap();
        let fresh = mock.refresh_token(&refresh).await.unwrap();
        assert_eq!(fresh.token_type, "Bearer");
        assert_eq!(mock.call_count("sign_in"), 1);
    }

    #[tokio::test]
    async fn missing_and_unconfirmed_accounts_report_their_kinds() {
        let mock = MockProvider::new(AuthProvider::Firebase);
        mock.with_unconfirmed_user("b@example.com", "pw");

        let err = mock.sign_in("nobody@example.com", "pw").await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::IdentityNotFound);

        let err = mock.sign_in("b@example.com", "pw").await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::NotConfirmed);
    }

    #[tokio::test]
    async fn outage_blankets_every_call() {
        let mock = MockProvider::new(AuthProvider::Cognito);
        mock.with_confirmed_user("c@example.com", "pw");
        mock.set_outage(Some(ProviderErrorKind::Transient));

        let err = mock.sign_in("c@example.com", "pw").await.unwrap_err();
        assert!(err.is_transient());
        let err = mock.verify_token("anything").await.unwrap_err();
        assert!(err.is_transient());
    }
}
