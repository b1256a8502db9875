//! Identity reconciliation.
//!
//! After a provider has authenticated someone, this layer folds that identity
//! into the local store: record the login for a known user, migrate the
//! attribution when the provider changed, or provision a row just in time for
//! an identity that has none. The local row stays authoritative for role and
//! account status; provider claims only seed it at creation.

use std::sync::Arc;

use anyhow::anyhow;

use super::error::ServiceError;
use super::metrics::{
    JIT_PROVISIONS_TOTAL, PROVIDER_MIGRATIONS_TOTAL, RECONCILIATION_CONFLICTS_TOTAL,
};
use super::store::{IdentityStore, StoreError};
use crate::models::{ClientProfile, IdentityMapping, User, UserRole};
use crate::providers::{AuthProvider, ProviderIdentity};

pub struct ReconciliationService {
    store: Arc<dyn IdentityStore>,
}

impl ReconciliationService {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Fold a successful authentication into the local store and return the
    /// authoritative user row.
    ///
    /// A provision that loses the insert race to a concurrent first login
    /// hits the email unique constraint and converts to the update path, so
    /// both racers come out with the same row.
    #[tracing::instrument(skip_all, fields(provider = %used))]
    pub async fn reconcile(
        &self,
        identity: &ProviderIdentity,
        used: AuthProvider,
    ) -> Result<User, ServiceError> {
        let email = identity.email.to_lowercase();

        if let Some(user) = self.store.find_user_by_email(&email).await? {
            return self.record(user, identity, used).await;
        }

        match self.provision(identity, used, &email).await {
            Ok(user) => Ok(user),
            Err(StoreError::DuplicateEmail) => {
                RECONCILIATION_CONFLICTS_TOTAL.inc();
                tracing::info!(email_known = true, "lost provisioning race, updating instead");
                let user = self.store.find_user_by_email(&email).await?.ok_or_else(|| {
                    ServiceError::Internal(anyhow!(
                        "user row missing after duplicate-email conflict"
                    ))
                })?;
                self.record(user, identity, used).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn record(
        &self,
        user: User,
        identity: &ProviderIdentity,
        used: AuthProvider,
    ) -> Result<User, ServiceError> {
        let previous = user.current_provider();
        if previous != Some(used) {
            let from = previous.map(|p| p.as_str()).unwrap_or("none");
            tracing::info!(
                user_id = %user.user_id,
                from,
                to = %used,
                "login migrated to a different provider"
            );
            PROVIDER_MIGRATIONS_TOTAL
                .with_label_values(&[from, used.as_str()])
                .inc();
        }

        let mapping = IdentityMapping::new(
            user.user_id,
            used,
            identity.subject.clone(),
            identity.email.to_lowercase(),
        );
        Ok(self.store.record_login(&mapping).await?)
    }

    async fn provision(
        &self,
        identity: &ProviderIdentity,
        used: AuthProvider,
        email: &str,
    ) -> Result<User, StoreError> {
        // The provider vouched for this identity, so the row starts active
        // and verified. Role comes from the provider claim when present.
        let role = identity
            .role_hint
            .as_deref()
            .and_then(|hint| hint.parse().ok())
            .unwrap_or(UserRole::Client);

        let user = User::new_provisioned(
            email.to_string(),
            identity.first_name.clone().unwrap_or_default(),
            identity.last_name.clone().unwrap_or_default(),
            role,
            used,
        );
        let mapping = IdentityMapping::new(
            user.user_id,
            used,
            identity.subject.clone(),
            email.to_string(),
        );
        let profile = match role {
            UserRole::Client => Some(ClientProfile::new(user.user_id, None)),
            _ => None,
        };

        self.store
            .create_user(&user, &mapping, profile.as_ref())
            .await?;

        JIT_PROVISIONS_TOTAL.with_label_values(&[role.as_str()]).inc();
        tracing::info!(
            user_id = %user.user_id,
            role = role.as_str(),
            "provisioned user on first sign-in"
        );
        Ok(user)
    }
}
