use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct File {
    pub id: String,
    pub owner_id: String,
    pub original_name: String,
    pub file_name: String,
    pub content_type: String,
    pub size: i64,
    pub file_hash: String,
    pub is_public: i64,
    pub is_locked: i64,
    pub share_code: Option<String>,
    pub download_count: i64,
    pub uploaded_at: String,
    pub expires_at: Option<String>,
    pub is_deleted: i64,
}

impl File {
    pub fn new(
        owner_id: String,
        original_name: String,
        file_name: String,
        content_type: String,
        size: i64,
        file_hash: String,
        retention_days: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        let expires_at = retention_days.map(|days| (now + Duration::days(days)).to_rfc3339());

        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            original_name,
            file_name,
            content_type,
            size,
            file_hash,
            is_public: 0,
            is_locked: 0,
            share_code: None,
            download_count: 0,
            uploaded_at: now.to_rfc3339(),
            expires_at,
            is_deleted: 0,
        }
    }
}

/// Shape returned to file owners; omits the on-disk storage name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResponse {
    pub id: String,
    pub original_name: String,
    pub content_type: String,
    pub size: i64,
    pub is_public: bool,
    pub is_locked: bool,
    pub share_code: Option<String>,
    pub download_count: i64,
    pub uploaded_at: String,
    pub expires_at: Option<String>,
}

impl From<File> for FileResponse {
    fn from(file: File) -> Self {
        Self {
            id: file.id,
            original_name: file.original_name,
            content_type: file.content_type,
            size: file.size,
            is_public: file.is_public == 1,
            is_locked: file.is_locked == 1,
            share_code: file.share_code,
            download_count: file.download_count,
            uploaded_at: file.uploaded_at,
            expires_at: file.expires_at,
        }
    }
}
