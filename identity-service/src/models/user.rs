use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::providers::AuthProvider;

/// Platform roles. Stored as text in `users.role_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Client,
    Therapist,
    Admin,
    SuperAdmin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Client => "client",
            UserRole::Therapist => "therapist",
            UserRole::Admin => "admin",
            UserRole::SuperAdmin => "super_admin",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "client" => Ok(UserRole::Client),
            "therapist" => Ok(UserRole::Therapist),
            "admin" => Ok(UserRole::Admin),
            "super_admin" => Ok(UserRole::SuperAdmin),
            _ => Err(format!("Invalid user role: {}", s)),
        }
    }
}

/// Account lifecycle states. Stored as text in `users.account_status_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    PendingVerification,
    Active,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::PendingVerification => "pending_verification",
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
        }
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending_verification" => Ok(AccountStatus::PendingVerification),
            "active" => Ok(AccountStatus::Active),
            "suspended" => Ok(AccountStatus::Suspended),
            _ => Err(format!("Invalid account status: {}", s)),
        }
    }
}

/// Local user record. The authoritative source for role and account status;
/// provider claims never overwrite these fields once the row exists.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role_code: String,
    pub account_status_code: String,
    pub is_verified: bool,
    /// Provider that last authenticated this user; routes future sign-ins.
    pub current_provider_code: Option<String>,
    pub last_login_utc: Option<DateTime<Utc>>,
    pub login_count: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// A user created through self-service registration. Starts unverified;
    /// therapists additionally wait for manual approval.
    pub fn new_registered(
        email: String,
        first_name: String,
        last_name: String,
        role: UserRole,
        provider: AuthProvider,
    ) -> Self {
        let now = Utc::now();
        let status = match role {
            UserRole::Therapist => AccountStatus::PendingVerification,
            _ => AccountStatus::Active,
        };
        Self {
            user_id: Uuid::new_v4(),
            email,
            first_name,
            last_name,
            role_code: role.as_str().to_string(),
            account_status_code: status.as_str().to_string(),
            is_verified: false,
            current_provider_code: Some(provider.as_str().to_string()),
            last_login_utc: None,
            login_count: 0,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// A user provisioned on first sign-in from a provider identity that has
    /// no local row yet. The provider already authenticated them, so the
    /// account starts active and verified.
    pub fn new_provisioned(
        email: String,
        first_name: String,
        last_name: String,
        role: UserRole,
        provider: AuthProvider,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            email,
            first_name,
            last_name,
            role_code: role.as_str().to_string(),
            account_status_code: AccountStatus::Active.as_str().to_string(),
            is_verified: true,
            current_provider_code: Some(provider.as_str().to_string()),
            last_login_utc: Some(now),
            login_count: 1,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn role(&self) -> UserRole {
        self.role_code.parse().unwrap_or(UserRole::Client)
    }

    pub fn status(&self) -> AccountStatus {
        self.account_status_code
            .parse()
            .unwrap_or(AccountStatus::PendingVerification)
    }

    pub fn current_provider(&self) -> Option<AuthProvider> {
        self.current_provider_code
            .as_deref()
            .and_then(|code| code.parse().ok())
    }

    /// Whether the account may hold an authenticated session.
    pub fn can_login(&self) -> bool {
        self.status() == AccountStatus::Active && self.is_verified
    }

    /// Wire representation, stripped of internal columns.
    pub fn sanitized(&self) -> UserResponse {
        UserResponse {
            user_id: self.user_id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role(),
            account_status: self.status(),
            is_verified: self.is_verified,
            current_provider: self.current_provider(),
            last_login_at: self.last_login_utc,
            login_count: self.login_count,
        }
    }
}

/// User payload returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[serde(rename = "id")]
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub account_status: AccountStatus,
    pub is_verified: bool,
    pub current_provider: Option<AuthProvider>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub login_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_therapist_waits_for_approval() {
        let user = User::new_registered(
            "t@example.com".to_string(),
            "Tess".to_string(),
            "Harper".to_string(),
            UserRole::Therapist,
            AuthProvider::Cognito,
        );
        assert_eq!(user.status(), AccountStatus::PendingVerification);
        assert!(!user.is_verified);
        assert!(!user.can_login());
    }

    #[test]
    fn registered_client_is_active_but_unverified() {
        let user = User::new_registered(
            "c@example.com".to_string(),
            "Cal".to_string(),
            "Reed".to_string(),
            UserRole::Client,
            AuthProvider::Firebase,
        );
        assert_eq!(user.status(), AccountStatus::Active);
        assert!(!user.is_verified);
        assert!(!user.can_login());
    }

    #[test]
    fn provisioned_user_can_login_immediately() {
        let user = User::new_provisioned(
            "p@example.com".to_string(),
            "Pia".to_string(),
            "Stone".to_string(),
            UserRole::Client,
            AuthProvider::Cognito,
        );
        assert!(user.can_login());
        assert_eq!(user.login_count, 1);
        assert_eq!(user.current_provider(), Some(AuthProvider::Cognito));
    }

    #[test]
    fn unknown_codes_fall_back_to_safe_defaults() {
        let mut user = User::new_provisioned(
            "x@example.com".to_string(),
            "Xen".to_string(),
            "Ives".to_string(),
            UserRole::Client,
            AuthProvider::Firebase,
        );
        user.role_code = "owner".to_string();
        user.account_status_code = "archived".to_string();
        assert_eq!(user.role(), UserRole::Client);
        assert_eq!(user.status(), AccountStatus::PendingVerification);
    }

    #[test]
    fn sanitized_renames_wire_fields() {
        let user = User::new_provisioned(
            "w@example.com".to_string(),
            "Wren".to_string(),
            "Aldo".to_string(),
            UserRole::Therapist,
            AuthProvider::Firebase,
        );
        let value = serde_json::to_value(user.sanitized()).unwrap();
        assert!(value.get("id").is_some());
        assert_eq!(value["currentProvider"], "firebase");
        assert_eq!(value["role"], "therapist");
        assert!(value.get("lastLoginAt").is_some());
        assert!(value.get("user_id").is_none());
    }
}
