use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::{AuthProvider, CognitoProvider, FirebaseProvider, ProviderCapability};
use crate::config::AuthSettings;

/// The set of constructed provider adapters, indexed by [`AuthProvider`].
///
/// A slot stays empty when its provider is unconfigured or its adapter failed
/// to construct; callers degrade per the resolution policy instead of
/// aborting.
#[derive(Clone, Default)]
pub struct RegisteredProviders {
    slots: [Option<Arc<dyn ProviderCapability>>; 2],
}

impl RegisteredProviders {
    fn index(kind: AuthProvider) -> usize {
        match kind {
            AuthProvider::Cognito => 0,
            AuthProvider::Firebase => 1,
        }
    }

    pub fn insert(&mut self, provider: Arc<dyn ProviderCapability>) {
        let index = Self::index(provider.kind());
        self.slots[index] = Some(provider);
    }

    pub fn get(&self, kind: AuthProvider) -> Option<Arc<dyn ProviderCapability>> {
        self.slots[Self::index(kind)].clone()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lazily-built provider set.
///
/// Adapters are constructed on first use, not at startup: check, build, then
/// set. Concurrent first callers may build redundantly; the first `set` wins
/// and the losers' adapters are dropped. Duplicate construction wastes a
/// little work but is safe, so no lock is held while building.
pub struct ProviderRegistry {
    settings: AuthSettings,
    inner: OnceLock<RegisteredProviders>,
}

impl ProviderRegistry {
    pub fn new(settings: AuthSettings) -> Self {
        Self {
            settings,
            inner: OnceLock::new(),
        }
    }

    /// Registry with a pre-seeded provider set, bypassing adapter
    /// construction. Used by tests to install mock providers.
    pub fn with_providers(settings: AuthSettings, providers: RegisteredProviders) -> Self {
        let inner = OnceLock::new();
        let _ = inner.set(providers);
        Self { settings, inner }
    }

    /// Provider configured as primary for registrations and unknown users.
    pub fn primary_kind(&self) -> AuthProvider {
        self.settings.primary_provider
    }

    pub fn universal_fallback(&self) -> bool {
        self.settings.enable_universal_fallback
    }

    pub fn get(&self, kind: AuthProvider) -> Option<Arc<dyn ProviderCapability>> {
        self.providers().get(kind)
    }

    pub fn registered(&self) -> Vec<AuthProvider> {
        [AuthProvider::Cognito, AuthProvider::Firebase]
            .into_iter()
            .filter(|kind| self.providers().get(*kind).is_some())
            .collect()
    }

    fn providers(&self) -> &RegisteredProviders {
        if let Some(inner) = self.inner.get() {
            return inner;
        }

        let built = self.build();
        if self.inner.set(built).is_err() {
            tracing::debug!("provider registry initialized concurrently, dropping duplicate");
        }
        self.inner
            .get()
            .expect("provider registry slot initialized above")
    }

    fn build(&self) -> RegisteredProviders {
        let timeout = Duration::from_secs(self.settings.provider_timeout_secs);
        let mut providers = RegisteredProviders::default();

        if let Some(settings) = self.settings.cognito.clone() {
            match CognitoProvider::new(settings, timeout) {
                Ok(provider) => providers.insert(Arc::new(provider)),
                Err(e) => tracing::error!(error = %e, "Cognito adapter failed to construct"),
            }
        }

        if let Some(settings) = self.settings.firebase.clone() {
            match FirebaseProvider::new(settings, timeout) {
                Ok(provider) => providers.insert(Arc::new(provider)),
                Err(e) => {
                    tracing::error!(error = %e, "Identity Platform adapter failed to construct")
                }
            }
        }

        if providers.is_empty() {
            tracing::error!("No identity provider is configured; auth operations will fail");
        } else {
            tracing::info!(
                providers = ?providers_names(&providers),
                primary = %self.settings.primary_provider,
                "identity providers registered"
            );
        }

        providers
    }
}

fn providers_names(providers: &RegisteredProviders) -> Vec<&'static str> {
    [AuthProvider::Cognito, AuthProvider::Firebase]
        .into_iter()
        .filter(|kind| providers.get(*kind).is_some())
        .map(|kind| kind.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CognitoSettings, FirebaseSettings};
    use crate::providers::MockProvider;

    fn settings(cognito: bool, firebase: bool) -> AuthSettings {
        AuthSettings {
            primary_provider: AuthProvider::Cognito,
            enable_universal_fallback: true,
            provider_timeout_secs: 5,
            request_timeout_secs: 30,
            cognito: cognito.then(|| CognitoSettings {
                region: "eu-west-1".to_string(),
                user_pool_id: "eu-west-1_TEST".to_string(),
                client_id: "client123".to_string(),
                client_secret: None,
            }),
            firebase: firebase.then(|| FirebaseSettings {
                api_key: "key".to_string(),
                project_id: "proj".to_string(),
            }),
        }
    }

    #[test]
    fn builds_only_configured_providers() {
        let registry = ProviderRegistry::new(settings(true, false));
        assert!(registry.get(AuthProvider::Cognito).is_some());
        assert!(registry.get(AuthProvider::Firebase).is_none());
        assert_eq!(registry.registered(), vec![AuthProvider::Cognito]);
    }

    #[test]
    fn empty_configuration_yields_an_empty_registry() {
        let registry = ProviderRegistry::new(settings(false, false));
        assert!(registry.get(AuthProvider::Cognito).is_none());
        assert!(registry.get(AuthProvider::Firebase).is_none());
        assert!(registry.registered().is_empty());
    }

    #[test]
    fn build_happens_once_and_is_reused() {
        let registry = ProviderRegistry::new(settings(true, true));
        let first = registry.get(AuthProvider::Cognito).unwrap();
        let second = registry.get(AuthProvider::Cognito).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn seeded_registry_skips_construction() {
        let mut providers = RegisteredProviders::default();
        providers.insert(Arc::new(MockProvider::new(AuthProvider::Firebase)));
        let registry = ProviderRegistry::with_providers(settings(false, false), providers);

        assert!(registry.get(AuthProvider::Firebase).is_some());
        assert!(registry.get(AuthProvider::Cognito).is_none());
        assert_eq!(registry.primary_kind(), AuthProvider::Cognito);
    }
}
