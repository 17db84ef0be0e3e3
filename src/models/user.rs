use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: String,
    pub last_login: Option<String>,
    pub login_attempts: i64,
    pub account_locked: i64,
    pub lock_until: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            created_at: user.created_at,
        }
    }
}

impl User {
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            password_hash,
            created_at: Utc::now().to_rfc3339(),
            last_login: None,
            login_attempts: 0,
            account_locked: 0,
            lock_until: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        if self.account_locked == 0 {
            return false;
        }

        if let Some(lock_until) = &self.lock_until
            && let Ok(lock_time) = DateTime::parse_from_rfc3339(lock_until)
        {
            return Utc::now() < lock_time;
        }

        false
    }
}
