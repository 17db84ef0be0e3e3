use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub created_at: String,
}

impl Team {
    pub fn new(name: String, owner_id: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            owner_id,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Admin,
    Member,
}

impl TeamRole {
    pub fn as_str(&self) -> &str {
        match self {
            TeamRole::Admin => "admin",
            TeamRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(TeamRole::Admin),
            "member" => Some(TeamRole::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeamMember {
    pub team_id: String,
    pub user_id: String,
    pub role: String,
    pub joined_at: String,
}

/// Associates a file with a team. Removing the share never deletes the file.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeamFileShare {
    pub id: String,
    pub team_id: String,
    pub file_id: String,
    pub shared_by: String,
    pub shared_at: String,
}

impl TeamFileShare {
    pub fn new(team_id: String, file_id: String, shared_by: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            team_id,
            file_id,
            shared_by,
            shared_at: Utc::now().to_rfc3339(),
        }
    }
}
