//! Provider resolution.
//!
//! Decides which provider should serve an operation before any credential is
//! checked: a known user goes to the provider currently attributed to them,
//! everyone else goes to the configured primary with a degradation path to
//! the other registered provider.

use std::sync::Arc;

use super::error::ServiceError;
use super::store::IdentityStore;
use crate::providers::{AuthProvider, ProviderCapability, ProviderRegistry};

/// A provider picked for one operation, with the kind it was picked as.
#[derive(Clone)]
pub struct ResolvedProvider {
    pub provider: Arc<dyn ProviderCapability>,
    pub kind: AuthProvider,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

pub struct ProviderResolver {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn IdentityStore>,
}

impl ProviderResolver {
    pub fn new(registry: Arc<ProviderRegistry>, store: Arc<dyn IdentityStore>) -> Self {
        Self { registry, store }
    }

    /// Resolve the provider for an operation, using the caller's email when
    /// one is known. Never dispatches a credential; resolution is routing
    /// only.
    pub async fn resolve(&self, email: Option<&str>) -> Result<ResolvedProvider, ServiceError> {
        if let Some(email) = email {
            if let Some(user) = self.store.find_user_by_email(email).await? {
                if let Some(kind) = user.current_provider() {
                    if let Some(provider) = self.registry.get(kind) {
                        tracing::debug!(provider = %kind, "resolved stored provider");
                        return Ok(ResolvedProvider { provider, kind });
                    }
                    tracing::warn!(
                        provider = %kind,
                        "stored provider is not registered; using default"
                    );
                }
            }
        }
        self.default_provider()
    }

    /// The primary provider, or the other one when the primary is not
    /// registered. Used directly for flows that carry no email.
    pub fn default_provider(&self) -> Result<ResolvedProvider, ServiceError> {
        let primary = self.registry.primary_kind();
        if let Some(provider) = self.registry.get(primary) {
            return Ok(ResolvedProvider {
                provider,
                kind: primary,
            });
        }

        let fallback = primary.other();
        if let Some(provider) = self.registry.get(fallback) {
            tracing::warn!(
                primary = %primary,
                fallback = %fallback,
                "primary provider unavailable; degrading to fallback"
            );
            return Ok(ResolvedProvider {
                provider,
                kind: fallback,
            });
        }

        Err(ServiceError::NoProviderAvailable)
    }
}
