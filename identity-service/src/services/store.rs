//! Persistence seam for identity data.
//!
//! [`IdentityStore`] is the contract the reconciliation and auth layers work
//! against; [`super::database::PostgresStore`] is the production
//! implementation and [`MemoryStore`] backs tests. Unique-constraint
//! violations surface as dedicated [`StoreError`] variants so callers can turn
//! a lost insert race into an update instead of an error.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ClientProfile, IdentityMapping, User};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The unique email constraint fired; a row for this address exists.
    #[error("email already in use")]
    DuplicateEmail,

    /// The unique (provider, subject) constraint fired.
    #[error("provider subject already mapped")]
    DuplicateSubject,

    #[error("database error: {0}")]
    Database(anyhow::Error),
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Case-insensitive lookup by email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Lookup by provider subject across all providers.
    async fn find_mapping_by_subject(
        &self,
        provider_subject: &str,
    ) -> Result<Option<IdentityMapping>, StoreError>;

    /// Insert the user, their first mapping and an optional client profile
    /// atomically.
    async fn create_user(
        &self,
        user: &User,
        mapping: &IdentityMapping,
        profile: Option<&ClientProfile>,
    ) -> Result<(), StoreError>;

    /// Record a successful login in one transaction: provider attribution,
    /// last-login timestamp, login counter, and the idempotent mapping
    /// insert. Returns the updated row.
    async fn record_login(&self, mapping: &IdentityMapping) -> Result<User, StoreError>;

    /// Flip the local verification flag. Returns the updated row, or None if
    /// no row matches the email.
    async fn mark_verified(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// In-memory store for tests. Enforces the same uniqueness rules as the
/// Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<Uuid, User>,
    mappings: Vec<IdentityMapping>,
    profiles: HashMap<Uuid, ClientProfile>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.peek().users.len()
    }

    pub fn mappings_for(&self, user_id: Uuid) -> Vec<IdentityMapping> {
        self.peek()
            .mappings
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn profile_for(&self, user_id: Uuid) -> Option<ClientProfile> {
        self.peek().profiles.get(&user_id).cloned()
    }

    fn peek(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    fn guard(&self) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Database(anyhow::anyhow!("memory store lock poisoned")))
    }
}

fn same_subject(a: &IdentityMapping, provider_code: &str, provider_subject: &str) -> bool {
    a.provider_code == provider_code && a.provider_subject == provider_subject
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.guard()?;
        Ok(inner
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let inner = self.guard()?;
        Ok(inner.users.get(&user_id).cloned())
    }

    async fn find_mapping_by_subject(
        &self,
        provider_subject: &str,
    ) -> Result<Option<IdentityMapping>, StoreError> {
        let inner = self.guard()?;
        Ok(inner
            .mappings
            .iter()
            .find(|m| m.provider_subject == provider_subject)
            .cloned())
    }

    async fn create_user(
        &self,
        user: &User,
        mapping: &IdentityMapping,
        profile: Option<&ClientProfile>,
    ) -> Result<(), StoreError> {
        let mut inner = self.guard()?;
        if inner
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::DuplicateEmail);
        }
        if inner
            .mappings
            .iter()
            .any(|m| same_subject(m, &mapping.provider_code, &mapping.provider_subject))
        {
            return Err(StoreError::DuplicateSubject);
        }

        inner.users.insert(user.user_id, user.clone());
        inner.mappings.push(mapping.clone());
        if let Some(profile) = profile {
            inner.profiles.insert(profile.user_id, profile.clone());
        }
        Ok(())
    }

    async fn record_login(&self, mapping: &IdentityMapping) -> Result<User, StoreError> {
        let mut inner = self.guard()?;
        let user = inner
            .users
            .get_mut(&mapping.user_id)
            .ok_or_else(|| StoreError::Database(anyhow::anyhow!("no user row for login")))?;

        let now = Utc::now();
        user.current_provider_code = Some(mapping.provider_code.clone());
        user.last_login_utc = Some(now);
        user.login_count += 1;
        user.updated_utc = now;
        let updated = user.clone();

        // First writer wins; a second mapping for the same subject or the same
        // (user, provider) pair is silently skipped, like ON CONFLICT DO NOTHING.
        let exists = inner.mappings.iter().any(|m| {
            same_subject(m, &mapping.provider_code, &mapping.provider_subject)
                || (m.user_id == mapping.user_id && m.provider_code == mapping.provider_code)
        });
        if !exists {
            // Only the first mapping a user ever gets is primary.
            let mut inserted = mapping.clone();
            inserted.is_primary = !inner.mappings.iter().any(|m| m.user_id == mapping.user_id);
            inner.mappings.push(inserted);
        }

        Ok(updated)
    }

    async fn mark_verified(&self, email: &str) -> Result<Option<User>, StoreError> {
        let mut inner = self.guard()?;
        let user = inner
            .users
            .values_mut()
            .find(|u| u.email.eq_ignore_ascii_case(email));
        Ok(user.map(|u| {
            u.is_verified = true;
            u.updated_utc = Utc::now();
            u.clone()
        }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
