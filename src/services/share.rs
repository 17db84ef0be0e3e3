use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::database::DbPool;
use crate::models::file::File;
use crate::models::shared_link::SharedLink;
use crate::services::file_storage::get_owned_file;
use crate::utils::crypto::{generate_share_code, hash_password};
use crate::utils::error::{AppError, AppResult};
use crate::utils::validation::{normalize_share_code, validate_password};

const CODE_ASSIGN_ATTEMPTS: usize = 5;

/// A share token resolved to its link and owning file. Policy checks (expiry,
/// limit, password) are the access validator's concern, not the resolver's.
#[derive(Debug, Clone)]
pub struct ResolvedShare {
    pub link: SharedLink,
    pub file: File,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateLinkOptions {
    pub expires_in_hours: Option<i64>,
    pub download_limit: Option<i64>,
    pub password: Option<String>,
}

fn live_file_filter_now() -> String {
    Utc::now().to_rfc3339()
}

pub async fn resolve_token(pool: &DbPool, token: &str) -> AppResult<ResolvedShare> {
    // Deactivated, deleted and never-existed all collapse into one generic
    // not-found so the response leaks nothing about link lifecycle.
    let link = sqlx::query_as::<_, SharedLink>(
        "SELECT * FROM shared_links WHERE share_token = ? AND is_active = 1",
    )
    .bind(token)
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| AppError::NotFound("Share link not found or expired".to_string()))?;

    let file = sqlx::query_as::<_, File>(
        "SELECT * FROM files WHERE id = ? AND is_deleted = 0 AND (expires_at IS NULL OR expires_at > ?)",
    )
    .bind(&link.file_id)
    .bind(live_file_filter_now())
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| AppError::NotFound("Share link not found or expired".to_string()))?;

    Ok(ResolvedShare { link, file })
}

/// Codes grant baseline access to the file itself, independent of any link.
pub async fn resolve_code(pool: &DbPool, code: &str) -> AppResult<File> {
    let normalized = normalize_share_code(code)?;

    sqlx::query_as::<_, File>(
        "SELECT * FROM files WHERE share_code = ? AND is_deleted = 0 AND (expires_at IS NULL OR expires_at > ?)",
    )
    .bind(&normalized)
    .bind(live_file_filter_now())
    .fetch_optional(pool.as_ref())
    .await?
    .ok_or_else(|| AppError::NotFound("Share code not found or expired".to_string()))
}

pub async fn create_share_link(
    pool: &DbPool,
    owner_id: &str,
    file_id: &str,
    options: CreateLinkOptions,
) -> AppResult<SharedLink> {
    let file = get_owned_file(pool, file_id, owner_id).await?;

    if let Some(limit) = options.download_limit
        && limit < 1
    {
        return Err(AppError::Validation(
            "Download limit must be at least 1".to_string(),
        ));
    }

    let expires_at = match options.expires_in_hours {
        Some(hours) if hours < 1 => {
            return Err(AppError::Validation(
                "Expiry must be at least one hour away".to_string(),
            ));
        }
        Some(hours) => Some((Utc::now() + Duration::hours(hours)).to_rfc3339()),
        None => None,
    };

    let password_hash = match &options.password {
        Some(password) => {
            validate_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let link = SharedLink::new(
        file.id.clone(),
        expires_at,
        options.download_limit,
        password_hash,
    );

    sqlx::query(
        "INSERT INTO shared_links (id, file_id, share_token, expires_at, download_limit, download_count, password_hash, is_active, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&link.id)
    .bind(&link.file_id)
    .bind(&link.share_token)
    .bind(&link.expires_at)
    .bind(link.download_limit)
    .bind(link.download_count)
    .bind(&link.password_hash)
    .bind(link.is_active)
    .bind(&link.created_at)
    .execute(pool.as_ref())
    .await?;

    tracing::info!(
        "Share link created: file={}, link={}, limit={:?}, protected={}",
        file.id,
        link.id,
        link.download_limit,
        link.has_password()
    );

    Ok(link)
}

pub async fn list_file_links(
    pool: &DbPool,
    owner_id: &str,
    file_id: &str,
) -> AppResult<Vec<SharedLink>> {
    get_owned_file(pool, file_id, owner_id).await?;

    let links = sqlx::query_as::<_, SharedLink>(
        "SELECT * FROM shared_links WHERE file_id = ? ORDER BY created_at DESC",
    )
    .bind(file_id)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(links)
}

/// Logical delete only; download events keep referencing the row.
pub async fn deactivate_share_link(pool: &DbPool, owner_id: &str, link_id: &str) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE shared_links SET is_active = 0
         WHERE id = ? AND file_id IN (SELECT id FROM files WHERE owner_id = ?)",
    )
    .bind(link_id)
    .bind(owner_id)
    .execute(pool.as_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Share link not found".to_string()));
    }

    tracing::info!("Share link deactivated: link={}", link_id);
    Ok(())
}

pub async fn assign_share_code(pool: &DbPool, owner_id: &str, file_id: &str) -> AppResult<String> {
    let file = get_owned_file(pool, file_id, owner_id).await?;

    if let Some(code) = file.share_code {
        return Ok(code);
    }

    for _ in 0..CODE_ASSIGN_ATTEMPTS {
        let code = generate_share_code();

        let result = sqlx::query(
            "UPDATE files SET share_code = ?
             WHERE id = ? AND NOT EXISTS (SELECT 1 FROM files WHERE share_code = ?)",
        )
        .bind(&code)
        .bind(file_id)
        .bind(&code)
        .execute(pool.as_ref())
        .await?;

        if result.rows_affected() == 1 {
            tracing::info!("Share code assigned: file={}, code={}", file_id, code);
            return Ok(code);
        }
    }

    Err(AppError::Internal(
        "Could not generate a unique share code".to_string(),
    ))
}

pub async fn clear_share_code(pool: &DbPool, owner_id: &str, file_id: &str) -> AppResult<()> {
    get_owned_file(pool, file_id, owner_id).await?;

    sqlx::query("UPDATE files SET share_code = NULL WHERE id = ?")
        .bind(file_id)
        .execute(pool.as_ref())
        .await?;

    Ok(())
}

/// Newest active password-protected link for a file. Locked files resolved via
/// share code validate the supplied password against this hash.
pub async fn find_password_link(pool: &DbPool, file_id: &str) -> AppResult<Option<SharedLink>> {
    let link = sqlx::query_as::<_, SharedLink>(
        "SELECT * FROM shared_links
         WHERE file_id = ? AND is_active = 1 AND password_hash IS NOT NULL
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(file_id)
    .fetch_optional(pool.as_ref())
    .await?;

    Ok(link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DbPool, test_pool};
    use crate::models::download_event::AccessMethod;
    use crate::services::access::{AccessDecision, DenyReason, validate_link_access};
    use crate::services::analytics::{Window, bucket_series, load_owner_event_times};
    use crate::services::download::{RecordOutcome, record_download};

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

    async fn seed_file(pool: &DbPool, owner_id: &str, share_code: Option<&str>) -> File {
        let mut file = File::new(
            owner_id.to_string(),
            "slides.pdf".to_string(),
            "slides.bin".to_string(),
            "application/pdf".to_string(),
            2048,
            "hash".to_string(),
            None,
        );
        file.share_code = share_code.map(|c| c.to_string());

        sqlx::query(
            "INSERT INTO files (id, owner_id, original_name, file_name, content_type, size, file_hash, share_code, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&file.id)
        .bind(&file.owner_id)
        .bind(&file.original_name)
        .bind(&file.file_name)
        .bind(&file.content_type)
        .bind(file.size)
        .bind(&file.file_hash)
        .bind(&file.share_code)
        .bind(&file.uploaded_at)
        .execute(pool.as_ref())
        .await
        .unwrap();

        file
    }

    #[tokio::test]
    async fn test_code_download_flow_lands_in_series() {
        let pool = test_pool().await;
        seed_user(&pool, "u1").await;
        let file = seed_file(&pool, "u1", Some("ABCD1234")).await;

        // Lookup accepts the code in any case.
        let resolved = resolve_code(&pool, "abcd1234").await.unwrap();
        assert_eq!(resolved.id, file.id);

        let outcome = record_download(
            &pool,
            &resolved,
            None,
            AccessMethod::Code,
            Some("10.0.0.1".to_string()),
            "agent".to_string(),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, RecordOutcome::Recorded(_)));

        let events = load_owner_event_times(&pool, "u1").await.unwrap();
        let series = bucket_series(&events, Window::Last24Hours, Utc::now());
        assert_eq!(series.iter().map(|b| b.count).sum::<i64>(), 1);
        assert_eq!(series.last().unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_protected_link_with_limit_one() {
        let pool = test_pool().await;
        seed_user(&pool, "u1").await;
        let file = seed_file(&pool, "u1", None).await;

        let link = create_share_link(
            &pool,
            "u1",
            &file.id,
            CreateLinkOptions {
                expires_in_hours: None,
                download_limit: Some(1),
                password: Some("open sesame".to_string()),
            },
        )
        .await
        .unwrap();

        let resolved = resolve_token(&pool, &link.share_token).await.unwrap();
        let decision =
            validate_link_access(&resolved.link, &resolved.file, Some("open sesame"), Utc::now())
                .unwrap();
        assert_eq!(decision, AccessDecision::Allowed);

        let outcome = record_download(
            &pool,
            &resolved.file,
            Some(&resolved.link),
            AccessMethod::Link,
            None,
            "agent".to_string(),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, RecordOutcome::Recorded(_)));

        // Second round: the stored count now blocks even a correct password.
        let resolved = resolve_token(&pool, &link.share_token).await.unwrap();
        let decision =
            validate_link_access(&resolved.link, &resolved.file, Some("open sesame"), Utc::now())
                .unwrap();
        assert_eq!(decision, AccessDecision::Denied(DenyReason::LimitReached));
    }

    #[tokio::test]
    async fn test_deactivated_link_resolves_like_missing() {
        let pool = test_pool().await;
        seed_user(&pool, "u1").await;
        let file = seed_file(&pool, "u1", None).await;

        let link = create_share_link(&pool, "u1", &file.id, CreateLinkOptions::default())
            .await
            .unwrap();
        deactivate_share_link(&pool, "u1", &link.id).await.unwrap();

        let dead = resolve_token(&pool, &link.share_token).await;
        let missing = resolve_token(&pool, "no-such-token").await;

        // Both failures carry the same message so responses leak nothing.
        match (dead, missing) {
            (Err(AppError::NotFound(a)), Err(AppError::NotFound(b))) => assert_eq!(a, b),
            _ => panic!("expected two NotFound errors"),
        }
    }

    #[tokio::test]
    async fn test_assign_code_is_idempotent() {
        let pool = test_pool().await;
        seed_user(&pool, "u1").await;
        let file = seed_file(&pool, "u1", None).await;

        let first = assign_share_code(&pool, "u1", &file.id).await.unwrap();
        let second = assign_share_code(&pool, "u1", &file.id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), crate::utils::crypto::SHARE_CODE_LEN);
    }
}
