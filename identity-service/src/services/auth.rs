//! Auth facade: the one service handlers talk to.
//!
//! Each operation is resolve, execute, reconcile in that order. Resolution
//! picks a provider, the executor runs the provider call with its fallback
//! policy, and reconciliation folds the result into the local store before
//! anything is returned to the wire.

use std::sync::Arc;

use super::error::ServiceError;
use super::executor::AuthOperationExecutor;
use super::metrics::AUTH_OPERATIONS_TOTAL;
use super::reconciliation::ReconciliationService;
use super::resolver::ProviderResolver;
use super::store::IdentityStore;
use crate::dtos::auth::{
    ConfirmRequest, ForgotPasswordRequest, LoginRequest, RefreshRequest, RefreshResponse,
    RegisterRequest, RegisterResponse, ResendCodeRequest, ResetPasswordRequest, SessionResponse,
    TherapistStatusResponse,
};
use crate::models::{ClientProfile, IdentityMapping, User, UserRole};
use crate::providers::{ProviderRegistry, ProviderSession, SignUpAttributes};

#[derive(Clone)]
pub struct AuthService {
    resolver: Arc<ProviderResolver>,
    executor: Arc<AuthOperationExecutor>,
    reconciliation: Arc<ReconciliationService>,
    store: Arc<dyn IdentityStore>,
}

impl AuthService {
    pub fn new(registry: Arc<ProviderRegistry>, store: Arc<dyn IdentityStore>) -> Self {
        Self {
            resolver: Arc::new(ProviderResolver::new(registry.clone(), store.clone())),
            executor: Arc::new(AuthOperationExecutor::new(registry)),
            reconciliation: Arc::new(ReconciliationService::new(store.clone())),
            store,
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn login(&self, req: LoginRequest) -> Result<SessionResponse, ServiceError> {
        let outcome = self.login_inner(req).await;
        Self::observe("login", outcome.is_ok());
        outcome
    }

    async fn login_inner(&self, req: LoginRequest) -> Result<SessionResponse, ServiceError> {
        let executed = match (req.id_token, req.email, req.password) {
            (Some(id_token), _, _) if !id_token.is_empty() => {
                let resolved = self.resolver.resolve(None).await?;
                self.executor.login_with_token(&resolved, &id_token).await?
            }
            (_, Some(email), Some(password)) if !email.is_empty() => {
                let resolved = self.resolver.resolve(Some(&email)).await?;
                self.executor.sign_in(&resolved, &email, &password).await?
            }
            _ => {
                return Err(ServiceError::Validation(
                    "Provide an idToken or an email and password".to_string(),
                ))
            }
        };

        let ProviderSession { identity, tokens } = executed.session;
        let user = self.reconciliation.reconcile(&identity, executed.used).await?;

        tracing::info!(user_id = %user.user_id, provider = %executed.used, "login succeeded");
        Ok(SessionResponse {
            user: user.sanitized(),
            tokens: tokens.into(),
        })
    }

    /// Self-service registration. The local row is created unverified right
    /// after the provider accepts the sign-up, so the confirm flow has a row
    /// to flip.
    #[tracing::instrument(skip_all)]
    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, ServiceError> {
        let outcome = self.register_inner(req).await;
        Self::observe("register", outcome.is_ok());
        outcome
    }

    async fn register_inner(
        &self,
        req: RegisterRequest,
    ) -> Result<RegisterResponse, ServiceError> {
        let role = Self::registration_role(req.role.as_deref())?;
        let email = req.email.to_lowercase();

        // Cheap local check before the provider round-trip; the unique index
        // still backstops races.
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        // Registration always lands on the configured primary.
        let resolved = self.resolver.default_provider()?;
        let receipt = self
            .executor
            .sign_up(
                &resolved,
                &SignUpAttributes {
                    email: email.clone(),
                    password: req.password,
                    first_name: req.first_name.clone(),
                    last_name: req.last_name.clone(),
                    phone_number: req.phone_number.clone(),
                    role: role.as_str().to_string(),
                },
            )
            .await?;

        let user = User::new_registered(
            email.clone(),
            req.first_name,
            req.last_name,
            role,
            resolved.kind,
        );
        let mapping = IdentityMapping::new(user.user_id, resolved.kind, receipt.subject, email);
        let profile = match role {
            UserRole::Client => Some(ClientProfile::new(user.user_id, req.phone_number)),
            _ => None,
        };
        self.store
            .create_user(&user, &mapping, profile.as_ref())
            .await?;

        tracing::info!(user_id = %user.user_id, provider = %resolved.kind, role = role.as_str(), "user registered");
        Ok(RegisterResponse {
            user_id: user.user_id,
        })
    }

    #[tracing::instrument(skip_all)]
    pub async fn confirm(&self, req: ConfirmRequest) -> Result<(), ServiceError> {
        let outcome = self.confirm_inner(req).await;
        Self::observe("confirm", outcome.is_ok());
        outcome
    }

    async fn confirm_inner(&self, req: ConfirmRequest) -> Result<(), ServiceError> {
        let email = req.email.to_lowercase();
        let resolved = self.resolver.resolve(Some(&email)).await?;
        self.executor
            .confirm_sign_up(&resolved, &email, &req.confirmation_code)
            .await?;

        // A row may not exist yet when confirmation arrives before the first
        // login of a provider-side account; reconciliation creates it then.
        if self.store.mark_verified(&email).await?.is_none() {
            tracing::warn!("confirmed an account with no local row yet");
        }
        Ok(())
    }

    /// Best effort by contract: the response never reveals whether the email
    /// exists, so provider failures are logged and swallowed.
    #[tracing::instrument(skip_all)]
    pub async fn resend_code(&self, req: ResendCodeRequest) {
        let email = req.email.to_lowercase();
        let result = match self.resolver.resolve(Some(&email)).await {
            Ok(resolved) => self.executor.resend_code(&resolved, &email).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "resend confirmation code failed");
        }
        Self::observe("resend_code", true);
    }

    /// Best effort, same anti-enumeration contract as [`Self::resend_code`].
    #[tracing::instrument(skip_all)]
    pub async fn forgot_password(&self, req: ForgotPasswordRequest) {
        let email = req.email.to_lowercase();
        let result = match self.resolver.resolve(Some(&email)).await {
            Ok(resolved) => self.executor.forgot_password(&resolved, &email).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "forgot password initiation failed");
        }
        Self::observe("forgot_password", true);
    }

    #[tracing::instrument(skip_all)]
    pub async fn reset_password(&self, req: ResetPasswordRequest) -> Result<(), ServiceError> {
        let email = req.email.to_lowercase();
        let outcome = match self.resolver.resolve(Some(&email)).await {
            Ok(resolved) => {
                self.executor
                    .reset_password(&resolved, &email, &req.code, &req.new_password)
                    .await
            }
            Err(e) => Err(e),
        };
        Self::observe("reset_password", outcome.is_ok());
        outcome
    }

    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, req: RefreshRequest) -> Result<RefreshResponse, ServiceError> {
        let outcome = self.executor.refresh(&req.refresh_token).await;
        Self::observe("refresh", outcome.is_ok());
        Ok(RefreshResponse {
            tokens: outcome?.into(),
        })
    }

    /// Verification status lookup for the therapist onboarding screen, keyed
    /// by provider subject so the frontend can poll before any local login.
    #[tracing::instrument(skip(self))]
    pub async fn therapist_status(
        &self,
        subject: &str,
    ) -> Result<TherapistStatusResponse, ServiceError> {
        let mapping = self
            .store
            .find_mapping_by_subject(subject)
            .await?
            .ok_or(ServiceError::UserNotFound)?;
        let user = self
            .store
            .find_user_by_id(mapping.user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;
        if user.role() != UserRole::Therapist {
            return Err(ServiceError::UserNotFound);
        }

        Ok(TherapistStatusResponse {
            status: user.status(),
            can_login: user.can_login(),
            is_verified: user.is_verified,
        })
    }

    fn registration_role(role: Option<&str>) -> Result<UserRole, ServiceError> {
        match role {
            None => Ok(UserRole::Client),
            Some(raw) => match raw.parse() {
                Ok(role @ (UserRole::Client | UserRole::Therapist)) => Ok(role),
                _ => Err(ServiceError::Validation(
                    "Role must be 'client' or 'therapist'".to_string(),
                )),
            },
        }
    }

    fn observe(operation: &str, ok: bool) {
        let status = if ok { "success" } else { "failure" };
        AUTH_OPERATIONS_TOTAL
            .with_label_values(&[operation, status])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthSettings;
    use crate::providers::{
        AuthProvider, MockProvider, ProviderIdentity, RegisteredProviders,
    };
    use crate::services::store::MemoryStore;

    struct Rig {
        auth: AuthService,
        store: Arc<MemoryStore>,
        cognito: Arc<MockProvider>,
        firebase: Arc<MockProvider>,
    }

    fn rig() -> Rig {
        let cognito = Arc::new(MockProvider::new(AuthProvider::Cognito));
        let firebase = Arc::new(MockProvider::new(AuthProvider::Firebase));
        let mut providers = RegisteredProviders::default();
        providers.insert(cognito.clone());
        providers.insert(firebase.clone());

        let settings = AuthSettings {
            primary_provider: AuthProvider::Cognito,
            enable_universal_fallback: true,
            provider_timeout_secs: 5,
            request_timeout_secs: 30,
            cognito: None,
            firebase: None,
        };
        let registry = Arc::new(ProviderRegistry::with_providers(settings, providers));
        let store = Arc::new(MemoryStore::new());

        Rig {
            auth: AuthService::new(registry, store.clone() as Arc<dyn IdentityStore>),
            store,
            cognito,
            firebase,
        }
    }

    fn password_login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            id_token: None,
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        }
    }

    #[tokio::test]
    async fn password_login_provisions_and_returns_a_session() {
        let rig = rig();
        rig.cognito.with_confirmed_user("nina@example.com", "pw12345678");

        let session = rig
            .auth
            .login(password_login("nina@example.com", "pw12345678"))
            .await
            .unwrap();

        assert_eq!(session.user.email, "nina@example.com");
        assert_eq!(session.user.current_provider, Some(AuthProvider::Cognito));
        assert!(session.tokens.refresh_token.is_some());
        assert_eq!(rig.store.user_count(), 1);
    }

    #[tokio::test]
    async fn login_requires_a_token_or_credentials() {
        let rig = rig();
        let err = rig
            .auth
            .login(LoginRequest {
                id_token: None,
                email: Some("x@example.com".to_string()),
                password: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn token_login_reports_the_verifying_provider() {
        let rig = rig();
        rig.firebase.issue_id_token(
            "tok-1",
            ProviderIdentity {
                subject: "fb-1".to_string(),
                email: "sol@example.com".to_string(),
                first_name: Some("Sol".to_string()),
                last_name: Some("Berg".to_string()),
                role_hint: None,
                email_verified: true,
            },
        );

        let session = rig
            .auth
            .login(LoginRequest {
                id_token: Some("tok-1".to_string()),
                email: None,
                password: None,
            })
            .await
            .unwrap();

        assert_eq!(session.user.current_provider, Some(AuthProvider::Firebase));
        assert_eq!(session.tokens.access_token, "tok-1");
    }

    #[tokio::test]
    async fn known_user_routes_to_their_stored_provider_on_next_login() {
        let rig = rig();
        rig.firebase.with_confirmed_user("routed@example.com", "pw12345678");

        // First login falls back to firebase; second resolves there directly.
        rig.auth
            .login(password_login("routed@example.com", "pw12345678"))
            .await
            .unwrap();
        rig.auth
            .login(password_login("routed@example.com", "pw12345678"))
            .await
            .unwrap();

        assert_eq!(rig.cognito.call_count("sign_in"), 1);
        assert_eq!(rig.firebase.call_count("sign_in"), 2);
    }

    fn register_req(email: &str, role: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "pw12345678".to_string(),
            first_name: "Rea".to_string(),
            last_name: "Voss".to_string(),
            phone_number: Some("+46700000001".to_string()),
            role: role.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn registration_creates_an_unverified_row_on_the_primary() {
        let rig = rig();

        let resp = rig
            .auth
            .register(register_req("Rea@Example.com", None))
            .await
            .unwrap();

        let user = rig
            .store
            .find_user_by_email("rea@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.user_id, resp.user_id);
        assert!(!user.is_verified);
        assert_eq!(user.current_provider(), Some(AuthProvider::Cognito));
        assert!(rig.store.profile_for(user.user_id).is_some());
        assert_eq!(rig.cognito.call_count("sign_up"), 1);
        assert_eq!(rig.firebase.call_count("sign_up"), 0);
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict_before_the_provider_call() {
        let rig = rig();
        rig.auth
            .register(register_req("dup@example.com", None))
            .await
            .unwrap();

        let err = rig
            .auth
            .register(register_req("DUP@example.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EmailAlreadyRegistered));
        assert_eq!(rig.cognito.call_count("sign_up"), 1);
    }

    #[tokio::test]
    async fn staff_roles_cannot_self_register() {
        let rig = rig();
        let err = rig
            .auth
            .register(register_req("boss@example.com", Some("admin")))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(rig.cognito.call_count("sign_up"), 0);
    }

    #[tokio::test]
    async fn confirm_flips_the_local_verification_flag() {
        let rig = rig();
        rig.auth
            .register(register_req("ver@example.com", None))
            .await
            .unwrap();

        rig.auth
            .confirm(ConfirmRequest {
                email: "ver@example.com".to_string(),
                confirmation_code: MockProvider::CONFIRMATION_CODE.to_string(),
            })
            .await
            .unwrap();

        let user = rig
            .store
            .find_user_by_email("ver@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(user.is_verified);
        assert_eq!(rig.cognito.is_confirmed("ver@example.com"), Some(true));
    }

    #[tokio::test]
    async fn wrong_confirmation_code_is_rejected() {
        let rig = rig();
        rig.auth
            .register(register_req("wc@example.com", None))
            .await
            .unwrap();

        let err = rig
            .auth
            .confirm(ConfirmRequest {
                email: "wc@example.com".to_string(),
                confirmation_code: "999999".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCode));
    }

    #[tokio::test]
    async fn forgot_password_never_reveals_whether_the_email_exists() {
        let rig = rig();
        // No account seeded; still completes without error.
        rig.auth
            .forgot_password(ForgotPasswordRequest {
                email: "ghost@example.com".to_string(),
            })
            .await;
        assert_eq!(rig.cognito.call_count("forgot_password"), 1);
    }

    #[tokio::test]
    async fn reset_password_changes_the_provider_credential() {
        let rig = rig();
        rig.cognito.with_confirmed_user("rp@example.com", "oldpassword1");

        rig.auth
            .reset_password(ResetPasswordRequest {
                email: "rp@example.com".to_string(),
                code: MockProvider::CONFIRMATION_CODE.to_string(),
                new_password: "newpassword1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(
            rig.cognito.password_of("rp@example.com").as_deref(),
            Some("newpassword1")
        );
    }

    #[tokio::test]
    async fn refresh_returns_a_fresh_bundle() {
        let rig = rig();
        rig.firebase.grant_refresh("rt-1", "fb-9");

        let resp = rig
            .auth
            .refresh(RefreshRequest {
                refresh_token: "rt-1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(resp.tokens.token_type, "Bearer");
    }

    #[tokio::test]
    async fn therapist_status_is_visible_by_subject_and_hidden_for_clients() {
        let rig = rig();
        rig.auth
            .register(register_req("thr@example.com", Some("therapist")))
            .await
            .unwrap();
        let subject = rig.cognito.subject_of("thr@example.com").unwrap();

        let status = rig.auth.therapist_status(&subject).await.unwrap();
        assert!(!status.can_login);
        assert!(!status.is_verified);

        // Clients resolve to not-found on this endpoint.
        rig.auth
            .register(register_req("cli@example.com", None))
            .await
            .unwrap();
        let client_subject = rig.cognito.subject_of("cli@example.com").unwrap();
        let err = rig
            .auth
            .therapist_status(&client_subject)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UserNotFound));
    }
}
