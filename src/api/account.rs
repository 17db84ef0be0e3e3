use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::{get, put},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::{AppState, require_user};
use crate::models::profile::Tier;
use crate::services::account::{change_tier, get_profile};
use crate::utils::error::{AppError, AppResult};
use crate::utils::helpers::json_response;

#[derive(Deserialize)]
struct TierRequest {
    tier: String,
}

async fn profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    let profile = get_profile(&state.db, &user_id).await?;
    Ok(json_response(&profile))
}

async fn set_tier(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TierRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;

    let tier = Tier::parse(&req.tier)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown tier: {}", req.tier)))?;

    let profile = change_tier(&state.db, &user_id, tier).await?;
    Ok(json_response(&profile))
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/profile", get(profile))
        .route("/tier", put(set_tier))
        .with_state(state)
}
