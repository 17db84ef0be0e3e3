use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Free accounts get a fixed storage allowance and time-limited files.
pub const FREE_STORAGE_LIMIT: i64 = 500 * 1024 * 1024;
pub const FREE_FILE_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub user_id: String,
    pub storage_used: i64,
    pub storage_limit: Option<i64>,
    pub tier: String,
    pub subscription_status: String,
    pub subscription_ends_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Pro,
}

impl Tier {
    pub fn as_str(&self) -> &str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Tier::Free),
            "pro" => Some(Tier::Pro),
            _ => None,
        }
    }

    /// None means unlimited.
    pub fn storage_limit(&self) -> Option<i64> {
        match self {
            Tier::Free => Some(FREE_STORAGE_LIMIT),
            Tier::Pro => None,
        }
    }

    pub fn file_retention_days(&self) -> Option<i64> {
        match self {
            Tier::Free => Some(FREE_FILE_RETENTION_DAYS),
            Tier::Pro => None,
        }
    }
}

impl Profile {
    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            storage_used: 0,
            storage_limit: Tier::Free.storage_limit(),
            tier: Tier::Free.as_str().to_string(),
            subscription_status: "inactive".to_string(),
            subscription_ends_at: None,
        }
    }

    pub fn tier(&self) -> Tier {
        Tier::parse(&self.tier).unwrap_or(Tier::Free)
    }

    pub fn has_room_for(&self, size: i64) -> bool {
        match self.storage_limit {
            Some(limit) => self.storage_used + size <= limit,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_profile_quota() {
        let mut profile = Profile::new("u1".to_string());
        assert!(profile.has_room_for(1024));
        profile.storage_used = FREE_STORAGE_LIMIT - 10;
        assert!(profile.has_room_for(10));
        assert!(!profile.has_room_for(11));
    }

    #[test]
    fn test_pro_profile_unlimited() {
        let mut profile = Profile::new("u1".to_string());
        profile.tier = Tier::Pro.as_str().to_string();
        profile.storage_limit = None;
        assert!(profile.has_room_for(i64::MAX / 2));
        assert_eq!(profile.tier(), Tier::Pro);
    }
}
