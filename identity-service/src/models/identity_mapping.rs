use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::providers::AuthProvider;

/// Link between a local user and one provider-side account.
///
/// A user holds at most one mapping per provider. `(provider_code,
/// provider_subject)` is unique across the table.
#[derive(Debug, Clone, FromRow)]
pub struct IdentityMapping {
    pub mapping_id: Uuid,
    pub user_id: Uuid,
    pub provider_code: String,
    pub provider_subject: String,
    pub provider_email: String,
    /// Set once when the mapping is first written; later sign-ins through the
    /// other provider never flip it.
    pub is_primary: bool,
    pub created_utc: DateTime<Utc>,
}

impl IdentityMapping {
    pub fn new(
        user_id: Uuid,
        provider: AuthProvider,
        provider_subject: String,
        provider_email: String,
    ) -> Self {
        Self {
            mapping_id: Uuid::new_v4(),
            user_id,
            provider_code: provider.as_str().to_string(),
            provider_subject,
            provider_email,
            is_primary: true,
            created_utc: Utc::now(),
        }
    }

    pub fn provider(&self) -> Option<AuthProvider> {
        self.provider_code.parse().ok()
    }
}
