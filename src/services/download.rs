use crate::database::DbPool;
use crate::models::download_event::{AccessMethod, DownloadEvent};
use crate::models::file::File;
use crate::models::shared_link::SharedLink;
use crate::utils::error::AppResult;

/// Result of recording a download. A link whose limit was consumed by a
/// concurrent request between validation and recording reports exhaustion
/// instead of overshooting.
#[derive(Debug)]
pub enum RecordOutcome {
    Recorded(DownloadEvent),
    LimitExhausted,
}

/// Appends one immutable download event and bumps the denormalized counters in
/// a single transaction. The link counter uses a conditional update so the
/// stored count can never pass the limit, however many validators raced.
pub async fn record_download(
    pool: &DbPool,
    file: &File,
    link: Option<&SharedLink>,
    method: AccessMethod,
    downloader_ip: Option<String>,
    user_agent: String,
) -> AppResult<RecordOutcome> {
    let event = DownloadEvent::new(
        file.id.clone(),
        link.map(|l| l.id.clone()),
        method,
        downloader_ip,
        user_agent,
    );

    let mut tx = pool.begin().await?;

    if let Some(link) = link {
        let result = sqlx::query(
            "UPDATE shared_links SET download_count = download_count + 1
             WHERE id = ? AND (download_limit IS NULL OR download_count < download_limit)",
        )
        .bind(&link.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            tracing::debug!("Download limit exhausted under race: link={}", link.id);
            return Ok(RecordOutcome::LimitExhausted);
        }
    }

    sqlx::query(
        "INSERT INTO download_events (id, file_id, shared_link_id, download_method, downloader_ip, downloader_user_agent, downloaded_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.id)
    .bind(&event.file_id)
    .bind(&event.shared_link_id)
    .bind(&event.download_method)
    .bind(&event.downloader_ip)
    .bind(&event.downloader_user_agent)
    .bind(&event.downloaded_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE files SET download_count = download_count + 1 WHERE id = ?")
        .bind(&file.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        "Download recorded: file={}, method={}, link={:?}",
        file.id,
        event.download_method,
        event.shared_link_id
    );

    Ok(RecordOutcome::Recorded(event))
}

/// Counters are a cache over the event log; this rebuilds them when they
/// drift (a failed recording run, manual cleanup, and so on).
pub async fn reconcile_counters(pool: &DbPool) -> AppResult<u64> {
    let files = sqlx::query(
        "UPDATE files SET download_count =
            (SELECT COUNT(*) FROM download_events WHERE download_events.file_id = files.id)",
    )
    .execute(pool.as_ref())
    .await?;

    sqlx::query(
        "UPDATE shared_links SET download_count =
            (SELECT COUNT(*) FROM download_events WHERE download_events.shared_link_id = shared_links.id)",
    )
    .execute(pool.as_ref())
    .await?;

    Ok(files.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DbPool, test_pool};
    use crate::models::shared_link::SharedLink;

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

    async fn seed_file(pool: &DbPool, owner_id: &str) -> File {
        let file = File::new(
            owner_id.to_string(),
            "notes.txt".to_string(),
            "notes.bin".to_string(),
            "text/plain".to_string(),
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

        file
    }

    async fn seed_link(pool: &DbPool, file_id: &str, download_limit: Option<i64>) -> SharedLink {
        let link = SharedLink::new(file_id.to_string(), None, download_limit, None);

        sqlx::query(
            "INSERT INTO shared_links (id, file_id, share_token, download_limit, download_count, is_active, created_at)
             VALUES (?, ?, ?, ?, 0, 1, ?)",
        )
        .bind(&link.id)
        .bind(&link.file_id)
        .bind(&link.share_token)
        .bind(link.download_limit)
        .bind(&link.created_at)
        .execute(pool.as_ref())
        .await
        .unwrap();

        link
    }

    async fn link_count(pool: &DbPool, link_id: &str) -> i64 {
        sqlx::query_scalar("SELECT download_count FROM shared_links WHERE id = ?")
            .bind(link_id)
            .fetch_one(pool.as_ref())
            .await
            .unwrap()
    }

    async fn file_count(pool: &DbPool, file_id: &str) -> i64 {
        sqlx::query_scalar("SELECT download_count FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_one(pool.as_ref())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_direct_download() {
        let pool = test_pool().await;
        seed_user(&pool, "u1").await;
        let file = seed_file(&pool, "u1").await;

        let outcome = record_download(
            &pool,
            &file,
            None,
            AccessMethod::Direct,
            Some("10.0.0.1".to_string()),
            "test-agent".to_string(),
        )
        .await
        .unwrap();

        let event = match outcome {
            RecordOutcome::Recorded(event) => event,
            RecordOutcome::LimitExhausted => panic!("unexpected limit"),
        };

        assert_eq!(event.download_method, "direct");
        assert_eq!(file_count(&pool, &file.id).await, 1);

        let logged: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM download_events WHERE file_id = ?")
            .bind(&file.id)
            .fetch_one(pool.as_ref())
            .await
            .unwrap();
        assert_eq!(logged, 1);
    }

    #[tokio::test]
    async fn test_limit_lands_exactly_on_boundary() {
        let pool = test_pool().await;
        seed_user(&pool, "u1").await;
        let file = seed_file(&pool, "u1").await;
        let link = seed_link(&pool, &file.id, Some(1)).await;

        let first = record_download(
            &pool,
            &file,
            Some(&link),
            AccessMethod::Link,
            None,
            "agent".to_string(),
        )
        .await
        .unwrap();
        assert!(matches!(first, RecordOutcome::Recorded(_)));
        assert_eq!(link_count(&pool, &link.id).await, 1);

        // Second attempt hits the conditional update and must not overshoot
        // or leave a stray event behind.
        let second = record_download(
            &pool,
            &file,
            Some(&link),
            AccessMethod::Link,
            None,
            "agent".to_string(),
        )
        .await
        .unwrap();
        assert!(matches!(second, RecordOutcome::LimitExhausted));
        assert_eq!(link_count(&pool, &link.id).await, 1);
        assert_eq!(file_count(&pool, &file.id).await, 1);

        let logged: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM download_events")
            .fetch_one(pool.as_ref())
            .await
            .unwrap();
        assert_eq!(logged, 1);
    }

    #[tokio::test]
    async fn test_reconcile_counters_from_log() {
        let pool = test_pool().await;
        seed_user(&pool, "u1").await;
        let file = seed_file(&pool, "u1").await;

        for _ in 0..3 {
            record_download(&pool, &file, None, AccessMethod::Code, None, "a".to_string())
                .await
                .unwrap();
        }

        // Drift the cache, then rebuild it from the event log.
        sqlx::query("UPDATE files SET download_count = 99 WHERE id = ?")
            .bind(&file.id)
            .execute(pool.as_ref())
            .await
            .unwrap();

        reconcile_counters(&pool).await.unwrap();
        assert_eq!(file_count(&pool, &file.id).await, 3);
    }
}
