use chrono::{Duration, Utc};

use crate::database::DbPool;
use crate::models::profile::{Profile, Tier};
use crate::utils::error::{AppError, AppResult};

pub async fn create_profile(pool: &DbPool, user_id: &str) -> AppResult<Profile> {
    let profile = Profile::new(user_id.to_string());

    sqlx::query(
        "INSERT INTO profiles (user_id, storage_used, storage_limit, tier, subscription_status, subscription_ends_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&profile.user_id)
    .bind(profile.storage_used)
    .bind(profile.storage_limit)
    .bind(&profile.tier)
    .bind(&profile.subscription_status)
    .bind(&profile.subscription_ends_at)
    .execute(pool.as_ref())
    .await?;

    Ok(profile)
}

pub async fn get_profile(pool: &DbPool, user_id: &str) -> AppResult<Profile> {
    sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))
}

/// Stand-in for the payment webhook boundary: flips the tier and adjusts the
/// storage allowance. Pro subscriptions run for 30 days from activation.
pub async fn change_tier(pool: &DbPool, user_id: &str, tier: Tier) -> AppResult<Profile> {
    let (status, ends_at) = match tier {
        Tier::Pro => (
            "active".to_string(),
            Some((Utc::now() + Duration::days(30)).to_rfc3339()),
        ),
        Tier::Free => ("inactive".to_string(), None),
    };

    sqlx::query(
        "UPDATE profiles SET tier = ?, storage_limit = ?, subscription_status = ?, subscription_ends_at = ?
         WHERE user_id = ?",
    )
    .bind(tier.as_str())
    .bind(tier.storage_limit())
    .bind(&status)
    .bind(&ends_at)
    .bind(user_id)
    .execute(pool.as_ref())
    .await?;

    tracing::info!("Tier changed: user={}, tier={}", user_id, tier.as_str());

    get_profile(pool, user_id).await
}

pub async fn add_storage_used(pool: &DbPool, user_id: &str, bytes: i64) -> AppResult<()> {
    sqlx::query("UPDATE profiles SET storage_used = storage_used + ? WHERE user_id = ?")
        .bind(bytes)
        .bind(user_id)
        .execute(pool.as_ref())
        .await?;

    Ok(())
}

pub async fn release_storage_used(pool: &DbPool, user_id: &str, bytes: i64) -> AppResult<()> {
    sqlx::query("UPDATE profiles SET storage_used = MAX(storage_used - ?, 0) WHERE user_id = ?")
        .bind(bytes)
        .bind(user_id)
        .execute(pool.as_ref())
        .await?;

    Ok(())
}
