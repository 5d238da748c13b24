use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub administrator: bool,
    pub guest: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Anonymous caller. Registration-time visibility rules never apply to
    /// guests, so the registration timestamp is immaterial.
    pub fn guest(now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            login: "guest".to_string(),
            administrator: false,
            guest: true,
            created_at: now,
        }
    }
}
