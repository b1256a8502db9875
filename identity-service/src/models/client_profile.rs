use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Client-role profile row, created in the same transaction as the user.
#[derive(Debug, Clone, FromRow)]
pub struct ClientProfile {
    pub profile_id: Uuid,
    pub user_id: Uuid,
    pub phone_number: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl ClientProfile {
    pub fn new(user_id: Uuid, phone_number: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            profile_id: Uuid::new_v4(),
            user_id,
            phone_number,
            created_utc: now,
            updated_utc: now,
        }
    }
}
