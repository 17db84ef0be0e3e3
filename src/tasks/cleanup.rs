use chrono::Utc;
use sqlx::FromRow;
use std::sync::Arc;
use tokio::fs;

use crate::database::DbPool;
use crate::services::account;
use crate::services::file_storage::storage_path;
use crate::websocket::connection::ConnectionManager;
use crate::websocket::events::ServerMessage;

#[derive(FromRow)]
struct ExpiredFile {
    id: String,
    owner_id: String,
    original_name: String,
    file_name: String,
    size: i64,
}

/// Free-tier retention: files past their expires_at are soft-deleted and
/// their bytes removed from disk. Download events stay; the log is permanent.
pub async fn cleanup_expired_files(
    db: &DbPool,
    ws_manager: &ConnectionManager,
) -> anyhow::Result<usize> {
    let now = Utc::now().to_rfc3339();

    tracing::info!("Starting cleanup of expired files");

    let expired_files = sqlx::query_as::<_, ExpiredFile>(
        "SELECT id, owner_id, original_name, file_name, size FROM files
         WHERE expires_at IS NOT NULL AND expires_at < ? AND is_deleted = 0",
    )
    .bind(&now)
    .fetch_all(db.as_ref())
    .await?;

    let count = expired_files.len();
    tracing::info!("Found {} expired files to delete", count);

    for file in expired_files {
        let path = storage_path(&file.file_name);
        if path.exists() {
            match fs::remove_file(&path).await {
                Ok(_) => {
                    tracing::info!("Deleted file from disk: {:?}", path);
                }
                Err(e) => {
                    tracing::warn!("Failed to delete file {:?}: {}", path, e);
                }
            }
        }

        sqlx::query("UPDATE files SET is_deleted = 1 WHERE id = ?")
            .bind(&file.id)
            .execute(db.as_ref())
            .await?;

        if let Err(e) = account::release_storage_used(db, &file.owner_id, file.size).await {
            tracing::warn!(
                "Failed to release storage for expired file {}: {}",
                file.id,
                e
            );
        }

        ws_manager
            .broadcast(ServerMessage::FileExpired {
                owner_id: file.owner_id.clone(),
                file_id: file.id.clone(),
                original_name: file.original_name.clone(),
            })
            .await;

        tracing::info!("Expired file removed: id={}, name={}", file.id, file.original_name);
    }

    tracing::info!("Cleanup completed: {} files processed", count);
    Ok(count)
}

pub fn start_cleanup_task(db: DbPool, ws_manager: Arc<ConnectionManager>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));

        loop {
            interval.tick().await;

            match cleanup_expired_files(&db, &ws_manager).await {
                Ok(count) => {
                    tracing::info!("File cleanup task completed: {} files cleaned", count);
                }
                Err(e) => {
                    tracing::error!("File cleanup task failed: {}", e);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;
    use chrono::Duration;

    #[tokio::test]
    async fn test_expired_file_soft_deleted_and_storage_released() {
        let pool = test_pool().await;
        let ws_manager = ConnectionManager::new();

        sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES ('u1', 'alice', 'x', '2026-01-01T00:00:00+00:00')",
        )
        .execute(pool.as_ref())
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO profiles (user_id, storage_used, tier) VALUES ('u1', 100, 'free')",
        )
        .execute(pool.as_ref())
        .await
        .unwrap();

        let stale = (Utc::now() - Duration::hours(1)).to_rfc3339();
        sqlx::query(
            "INSERT INTO files (id, owner_id, original_name, file_name, content_type, size, file_hash, uploaded_at, expires_at)
             VALUES ('f1', 'u1', 'old.txt', 'old.bin', 'text/plain', 100, 'h', '2026-01-01T00:00:00+00:00', ?)",
        )
        .bind(&stale)
        .execute(pool.as_ref())
        .await
        .unwrap();

        let cleaned = cleanup_expired_files(&pool, &ws_manager).await.unwrap();
        assert_eq!(cleaned, 1);

        let deleted: i64 = sqlx::query_scalar("SELECT is_deleted FROM files WHERE id = 'f1'")
            .fetch_one(pool.as_ref())
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let used: i64 = sqlx::query_scalar("SELECT storage_used FROM profiles WHERE user_id = 'u1'")
            .fetch_one(pool.as_ref())
            .await
            .unwrap();
        assert_eq!(used, 0);
    }

    #[tokio::test]
    async fn test_unexpired_files_untouched() {
        let pool = test_pool().await;
        let ws_manager = ConnectionManager::new();

        sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES ('u1', 'alice', 'x', '2026-01-01T00:00:00+00:00')",
        )
        .execute(pool.as_ref())
        .await
        .unwrap();

        let fresh = (Utc::now() + Duration::days(3)).to_rfc3339();
        sqlx::query(
            "INSERT INTO files (id, owner_id, original_name, file_name, content_type, size, file_hash, uploaded_at, expires_at)
             VALUES ('f1', 'u1', 'new.txt', 'new.bin', 'text/plain', 100, 'h', '2026-01-01T00:00:00+00:00', ?)",
        )
        .bind(&fresh)
        .execute(pool.as_ref())
        .await
        .unwrap();

        // Pro files have no expiry at all.
        sqlx::query(
            "INSERT INTO files (id, owner_id, original_name, file_name, content_type, size, file_hash, uploaded_at)
             VALUES ('f2', 'u1', 'keep.txt', 'keep.bin', 'text/plain', 100, 'h2', '2026-01-01T00:00:00+00:00')",
        )
        .execute(pool.as_ref())
        .await
        .unwrap();

        let cleaned = cleanup_expired_files(&pool, &ws_manager).await.unwrap();
        assert_eq!(cleaned, 0);
    }
}
