use crate::database::DbPool;
use crate::models::file::File;
use crate::services::account;
use crate::services::file_validation::validate_upload;
use crate::utils::crypto::hash_file;
use crate::utils::error::{AppError, AppResult};
use crate::utils::validation::validate_file_name;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const UPLOAD_DIR: &str = "./uploads";

pub fn storage_path(file_name: &str) -> PathBuf {
    PathBuf::from(UPLOAD_DIR).join(file_name)
}

pub async fn save_file(
    pool: &DbPool,
    owner_id: &str,
    original_name: String,
    claimed_mime: String,
    data: Vec<u8>,
) -> AppResult<File> {
    validate_file_name(&original_name)?;

    tracing::info!(
        "Uploading file: {} ({} bytes, type: {})",
        original_name,
        data.len(),
        claimed_mime
    );

    let content_type = validate_upload(&data, &claimed_mime)?;

    let profile = account::get_profile(pool, owner_id).await?;
    if !profile.has_room_for(data.len() as i64) {
        return Err(AppError::StorageLimit(
            "Not enough storage left on your plan".to_string(),
        ));
    }

    let file_hash = hash_file(&data);

    let existing = sqlx::query_as::<_, File>(
        "SELECT * FROM files WHERE file_hash = ? AND owner_id = ? AND is_deleted = 0",
    )
    .bind(&file_hash)
    .bind(owner_id)
    .fetch_optional(pool.as_ref())
    .await?;

    if let Some(existing_file) = existing {
        tracing::info!(
            "File deduplicated: hash={}, existing_id={}",
            file_hash,
            existing_file.id
        );
        return Ok(existing_file);
    }

    fs::create_dir_all(UPLOAD_DIR)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create upload directory: {}", e)))?;

    let file_name = format!("{}.bin", uuid::Uuid::new_v4());
    let file_path = storage_path(&file_name);

    let mut file = fs::File::create(&file_path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create file: {}", e)))?;

    file.write_all(&data)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to write file: {}", e)))?;

    let file_model = File::new(
        owner_id.to_string(),
        original_name,
        file_name,
        content_type,
        data.len() as i64,
        file_hash,
        profile.tier().file_retention_days(),
    );

    sqlx::query(
        "INSERT INTO files (id, owner_id, original_name, file_name, content_type, size, file_hash, is_public, is_locked, share_code, download_count, uploaded_at, expires_at, is_deleted)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&file_model.id)
    .bind(&file_model.owner_id)
    .bind(&file_model.original_name)
    .bind(&file_model.file_name)
    .bind(&file_model.content_type)
    .bind(file_model.size)
    .bind(&file_model.file_hash)
    .bind(file_model.is_public)
    .bind(file_model.is_locked)
    .bind(&file_model.share_code)
    .bind(file_model.download_count)
    .bind(&file_model.uploaded_at)
    .bind(&file_model.expires_at)
    .bind(file_model.is_deleted)
    .execute(pool.as_ref())
    .await?;

    account::add_storage_used(pool, owner_id, file_model.size).await?;

    tracing::info!(
        "File saved: id={}, name={}, size={} bytes, owner={}",
        file_model.id,
        file_model.original_name,
        file_model.size,
        owner_id
    );

    Ok(file_model)
}

pub async fn get_owned_file(pool: &DbPool, file_id: &str, owner_id: &str) -> AppResult<File> {
    sqlx::query_as::<_, File>(
        "SELECT * FROM files WHERE id = ? AND owner_id = ? AND is_deleted = 0",
    )
    .bind(file_id)
    .bind(owner_id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| AppError::NotFound("File not found".to_string()))
}

pub async fn get_public_file(pool: &DbPool, file_id: &str) -> AppResult<File> {
    sqlx::query_as::<_, File>(
        "SELECT * FROM files WHERE id = ? AND is_public = 1 AND is_deleted = 0",
    )
    .bind(file_id)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| AppError::NotFound("File not found".to_string()))
}

pub async fn read_file_bytes(file: &File) -> AppResult<Vec<u8>> {
    let path = storage_path(&file.file_name);

    if !path.exists() {
        tracing::error!("File missing on disk: id={}, path={:?}", file.id, path);
        return Err(AppError::NotFound("File not found".to_string()));
    }

    fs::read(&path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read file: {}", e)))
}

pub async fn list_user_files(pool: &DbPool, owner_id: &str) -> AppResult<Vec<File>> {
    let files = sqlx::query_as::<_, File>(
        "SELECT * FROM files WHERE owner_id = ? AND is_deleted = 0 ORDER BY uploaded_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool.as_ref())
    .await?;

    tracing::debug!("Found {} files for user {}", files.len(), owner_id);
    Ok(files)
}

pub async fn rename_file(
    pool: &DbPool,
    file_id: &str,
    owner_id: &str,
    new_name: String,
) -> AppResult<File> {
    validate_file_name(&new_name)?;

    let file = get_owned_file(pool, file_id, owner_id).await?;

    sqlx::query("UPDATE files SET original_name = ? WHERE id = ?")
        .bind(&new_name)
        .bind(&file.id)
        .execute(pool.as_ref())
        .await?;

    Ok(File {
        original_name: new_name,
        ..file
    })
}

pub async fn set_file_public(
    pool: &DbPool,
    file_id: &str,
    owner_id: &str,
    is_public: bool,
) -> AppResult<()> {
    get_owned_file(pool, file_id, owner_id).await?;

    sqlx::query("UPDATE files SET is_public = ? WHERE id = ?")
        .bind(if is_public { 1 } else { 0 })
        .bind(file_id)
        .execute(pool.as_ref())
        .await?;

    Ok(())
}

/// Locking a file only makes sense when some active link carries a password,
/// otherwise nothing could ever unlock it through the share flow.
pub async fn set_file_locked(
    pool: &DbPool,
    file_id: &str,
    owner_id: &str,
    is_locked: bool,
) -> AppResult<()> {
    get_owned_file(pool, file_id, owner_id).await?;

    if is_locked {
        let protected_links: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shared_links WHERE file_id = ? AND is_active = 1 AND password_hash IS NOT NULL",
        )
        .bind(file_id)
        .fetch_one(pool.as_ref())
        .await?;

        if protected_links == 0 {
            return Err(AppError::Validation(
                "Create a password-protected share link before locking this file".to_string(),
            ));
        }
    }

    sqlx::query("UPDATE files SET is_locked = ? WHERE id = ?")
        .bind(if is_locked { 1 } else { 0 })
        .bind(file_id)
        .execute(pool.as_ref())
        .await?;

    Ok(())
}

pub async fn delete_file(pool: &DbPool, file_id: &str, owner_id: &str) -> AppResult<()> {
    let file = get_owned_file(pool, file_id, owner_id).await?;

    sqlx::query("UPDATE files SET is_deleted = 1 WHERE id = ?")
        .bind(&file.id)
        .execute(pool.as_ref())
        .await?;

    account::release_storage_used(pool, owner_id, file.size).await?;

    let path = storage_path(&file.file_name);
    if path.exists()
        && let Err(e) = fs::remove_file(&path).await
    {
        tracing::warn!("Failed to remove file from disk: {:?}: {}", path, e);
    }

    tracing::info!(
        "File marked as deleted: id={}, name={}, owner={}",
        file.id,
        file.original_name,
        owner_id
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DbPool, test_pool};
    use crate::services::account;

    async fn seed_user(pool: &DbPool, user_id: &str) {
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, 'x', '2026-01-01T00:00:00+00:00')",
        )
        .bind(user_id)
        .bind(format!("user-{}", user_id))
        .execute(pool.as_ref())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_upload_rejected_when_quota_exhausted() {
        let pool = test_pool().await;
        seed_user(&pool, "u1").await;
        account::create_profile(&pool, "u1").await.unwrap();

        // Ten bytes of headroom left on the free allowance.
        let limit = crate::models::profile::FREE_STORAGE_LIMIT;
        sqlx::query("UPDATE profiles SET storage_used = ? WHERE user_id = 'u1'")
            .bind(limit - 10)
            .execute(pool.as_ref())
            .await
            .unwrap();

        let data = b"this text file is larger than ten bytes\n".to_vec();
        let result = save_file(
            &pool,
            "u1",
            "notes.txt".to_string(),
            "text/plain".to_string(),
            data,
        )
        .await;

        assert!(matches!(result, Err(AppError::StorageLimit(_))));
    }

    #[tokio::test]
    async fn test_lock_requires_protected_link() {
        let pool = test_pool().await;
        seed_user(&pool, "u1").await;

        let file = crate::models::file::File::new(
            "u1".to_string(),
            "doc.pdf".to_string(),
            "doc.bin".to_string(),
            "application/pdf".to_string(),
            64,
            "hash".to_string(),
            None,
        );
        sqlx::query(
            "INSERT INTO files (id, owner_id, original_name, file_name, content_type, size, file_hash, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&file.id)
        .bind(&file.owner_id)
        .bind(&file.original_name)
        .bind(&file.file_name)
        .bind(&file.content_type)
        .bind(file.size)
        .bind(&file.file_hash)
        .bind(&file.uploaded_at)
        .execute(pool.as_ref())
        .await
        .unwrap();

        let result = set_file_locked(&pool, &file.id, "u1", true).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        // Unlocking is always allowed.
        set_file_locked(&pool, &file.id, "u1", false).await.unwrap();
    }
}
