use axum::{
    Json, Router,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode, header},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::database::DbPool;
use crate::models::user::{User, UserResponse};
use crate::services::auth::{LoginRequest, RegisterRequest, login_user, register_user};
use crate::utils::error::{AppError, AppResult};
use crate::utils::helpers::json_response;
use crate::utils::jwt::JwtService;
use crate::websocket::connection::ConnectionManager;

pub struct AppState {
    pub db: DbPool,
    pub jwt_service: Arc<JwtService>,
    pub ws_manager: Arc<ConnectionManager>,
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Resolves the bearer token to the current account. Lives outside the auth
/// middleware so dashboards can probe token validity without a 401 cascade.
async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Auth("Missing or invalid authorization header".to_string()))?;

    let user_id = state.jwt_service.extract_user_id(token)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_optional(state.db.as_ref())
        .await?
        .ok_or_else(|| AppError::Auth("User no longer exists".to_string()))?;

    Ok(json_response(&UserResponse::from(user)))
}

async fn register(
    State(state): State<Arc<AppState>>,
    ConnectInfo(_addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let response = register_user(&state.db, payload, &state.jwt_service).await?;
    Ok(json_response(&response))
}

async fn login(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let ip = addr.ip().to_string();
    let response = login_user(&state.db, payload, ip, &state.jwt_service).await?;
    Ok(json_response(&response))
}

async fn logout() -> StatusCode {
    StatusCode::OK
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state)
}
