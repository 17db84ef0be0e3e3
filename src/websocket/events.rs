use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Heartbeat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        user_id: String,
    },
    /// A download event landed for one of the owner's files. Dashboards
    /// re-run their aggregation queries on receipt; no deltas are pushed.
    DownloadRecorded {
        owner_id: String,
        file_id: String,
        download_count: i64,
        download_method: String,
    },
    /// Free-tier retention removed a file.
    FileExpired {
        owner_id: String,
        file_id: String,
        original_name: String,
    },
    Error {
        message: String,
    },
    Pong,
}

impl ServerMessage {
    /// Change-feed filter: owner-scoped messages reach only the owner's
    /// connections, everything else fans out to all.
    pub fn visible_to(&self, user_id: &str) -> bool {
        match self {
            ServerMessage::DownloadRecorded { owner_id, .. } => owner_id == user_id,
            ServerMessage::FileExpired { owner_id, .. } => owner_id == user_id,
            _ => true,
        }
    }
}
