use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::crypto::generate_share_token;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SharedLink {
    pub id: String,
    pub file_id: String,
    pub share_token: String,
    pub expires_at: Option<String>,
    pub download_limit: Option<i64>,
    pub download_count: i64,
    pub password_hash: Option<String>,
    pub is_active: i64,
    pub created_at: String,
}

impl SharedLink {
    pub fn new(
        file_id: String,
        expires_at: Option<String>,
        download_limit: Option<i64>,
        password_hash: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_id,
            share_token: generate_share_token(),
            expires_at,
            download_limit,
            download_count: 0,
            password_hash,
            is_active: 1,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// Public shape for share pages; never exposes the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedLinkResponse {
    pub share_token: String,
    pub file_name: String,
    pub content_type: String,
    pub size: i64,
    pub expires_at: Option<String>,
    pub download_limit: Option<i64>,
    pub download_count: i64,
    pub requires_password: bool,
}
