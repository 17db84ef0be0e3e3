use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
    Direct,
    Code,
    Link,
    Email,
}

impl AccessMethod {
    pub fn as_str(&self) -> &str {
        match self {
            AccessMethod::Direct => "direct",
            AccessMethod::Code => "code",
            AccessMethod::Link => "link",
            AccessMethod::Email => "email",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(AccessMethod::Direct),
            "code" => Some(AccessMethod::Code),
            "link" => Some(AccessMethod::Link),
            "email" => Some(AccessMethod::Email),
            _ => None,
        }
    }
}

/// Immutable record of one successful file access. Counters on files and
/// shared_links are caches; these rows are the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DownloadEvent {
    pub id: String,
    pub file_id: String,
    pub shared_link_id: Option<String>,
    pub download_method: String,
    pub downloader_ip: Option<String>,
    pub downloader_user_agent: String,
    pub downloaded_at: String,
}

impl DownloadEvent {
    pub fn new(
        file_id: String,
        shared_link_id: Option<String>,
        method: AccessMethod,
        downloader_ip: Option<String>,
        downloader_user_agent: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_id,
            shared_link_id,
            download_method: method.as_str().to_string(),
            downloader_ip,
            downloader_user_agent,
            downloaded_at: Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_method_roundtrip() {
        for method in [
            AccessMethod::Direct,
            AccessMethod::Code,
            AccessMethod::Link,
            AccessMethod::Email,
        ] {
            assert_eq!(AccessMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(AccessMethod::parse("ftp"), None);
    }
}
