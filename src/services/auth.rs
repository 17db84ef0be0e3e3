use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::database::DbPool;
use crate::models::login_attempt::LoginAttempt;
use crate::models::user::{User, UserResponse};
use crate::services::account;
use crate::utils::crypto::{hash_password, verify_password};
use crate::utils::error::{AppError, AppResult};
use crate::utils::jwt::JwtService;
use crate::utils::validation::{validate_password, validate_username};

const MAX_LOGIN_ATTEMPTS: i64 = 10;
const LOGIN_THROTTLE_SECONDS: i64 = 3;

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

pub async fn register_user(
    pool: &DbPool,
    request: RegisterRequest,
    jwt_service: &JwtService,
) -> AppResult<AuthResponse> {
    validate_username(&request.username)?;
    validate_password(&request.password)?;

    let username_exists: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE LOWER(username) = LOWER(?)")
            .bind(&request.username)
            .fetch_one(pool.as_ref())
            .await?;

    if username_exists > 0 {
        return Err(AppError::BadRequest("Username already exists".to_string()));
    }

    let password_hash = hash_password(&request.password)?;
    let user = User::new(request.username.clone(), password_hash);

    sqlx::query(
        "INSERT INTO users (id, username, password_hash, created_at, login_attempts, account_locked)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.created_at)
    .bind(user.login_attempts)
    .bind(user.account_locked)
    .execute(pool.as_ref())
    .await?;

    account::create_profile(pool, &user.id).await?;

    tracing::info!("User registered: id={}, username={}", user.id, user.username);

    let token = jwt_service.generate_token(&user.id, &user.username)?;

    Ok(AuthResponse {
        user: UserResponse::from(user),
        token,
    })
}

pub async fn login_user(
    pool: &DbPool,
    request: LoginRequest,
    ip_address: String,
    jwt_service: &JwtService,
) -> AppResult<AuthResponse> {
    let last_attempt: Option<String> = sqlx::query_scalar(
        "SELECT timestamp FROM login_attempts WHERE username = ? ORDER BY timestamp DESC LIMIT 1",
    )
    .bind(&request.username)
    .fetch_optional(pool.as_ref())
    .await?;

    if let Some(last_timestamp) = last_attempt
        && let Ok(last_time) = chrono::DateTime::parse_from_rfc3339(&last_timestamp)
    {
        let elapsed = Utc::now().signed_duration_since(last_time.with_timezone(&Utc));
        if elapsed.num_seconds() < LOGIN_THROTTLE_SECONDS {
            return Err(AppError::RateLimitExceeded);
        }
    }

    let user_result =
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(username) = LOWER(?)")
            .bind(&request.username)
            .fetch_optional(pool.as_ref())
            .await?;

    let user = match user_result {
        Some(u) => u,
        None => {
            let attempt = LoginAttempt::new(
                request.username.clone(),
                ip_address,
                false,
                Some("User not found".to_string()),
            );
            save_login_attempt(pool, &attempt).await?;
            return Err(AppError::Auth("Invalid credentials".to_string()));
        }
    };

    if user.is_locked() {
        return Err(AppError::Auth(
            "Account is locked. Try again later.".to_string(),
        ));
    }

    let is_valid = verify_password(&request.password, &user.password_hash)?;

    if !is_valid {
        let new_attempts = user.login_attempts + 1;
        let (locked, lock_until) = if new_attempts >= MAX_LOGIN_ATTEMPTS {
            let lock_time = Utc::now() + Duration::hours(1);
            (1, Some(lock_time.to_rfc3339()))
        } else {
            (0, None)
        };

        sqlx::query(
            "UPDATE users SET login_attempts = ?, account_locked = ?, lock_until = ? WHERE id = ?",
        )
        .bind(new_attempts)
        .bind(locked)
        .bind(&lock_until)
        .bind(&user.id)
        .execute(pool.as_ref())
        .await?;

        let attempt = LoginAttempt::new(
            request.username.clone(),
            ip_address,
            false,
            Some("Invalid password".to_string()),
        );
        save_login_attempt(pool, &attempt).await?;

        return Err(AppError::Auth("Invalid credentials".to_string()));
    }

    sqlx::query(
        "UPDATE users SET login_attempts = 0, account_locked = 0, lock_until = NULL, last_login = ? WHERE id = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(&user.id)
    .execute(pool.as_ref())
    .await?;

    let attempt = LoginAttempt::new(request.username.clone(), ip_address, true, None);
    save_login_attempt(pool, &attempt).await?;

    let token = jwt_service.generate_token(&user.id, &user.username)?;

    Ok(AuthResponse {
        user: UserResponse::from(user),
        token,
    })
}

async fn save_login_attempt(pool: &DbPool, attempt: &LoginAttempt) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO login_attempts (id, username, ip_address, success, timestamp, failure_reason)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&attempt.id)
    .bind(&attempt.username)
    .bind(&attempt.ip_address)
    .bind(attempt.success)
    .bind(&attempt.timestamp)
    .bind(&attempt.failure_reason)
    .execute(pool.as_ref())
    .await?;

    Ok(())
}
