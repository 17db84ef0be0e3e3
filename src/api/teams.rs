use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get, post},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::{AppState, require_user};
use crate::models::file::FileResponse;
use crate::services::team::{
    add_member, create_team, list_team_files, list_user_teams, remove_member, remove_team_share,
    share_file_to_team,
};
use crate::utils::error::AppResult;
use crate::utils::helpers::{json_list, json_response};

#[derive(Deserialize)]
struct CreateTeamRequest {
    name: String,
}

#[derive(Deserialize)]
struct MemberRequest {
    user_id: String,
}

#[derive(Deserialize)]
struct ShareFileRequest {
    file_id: String,
}

async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTeamRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    let team = create_team(&state.db, &user_id, req.name).await?;
    Ok(json_response(&team))
}

async fn list_teams(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<serde_json::Value>>> {
    let user_id = require_user(&headers)?;
    let teams = list_user_teams(&state.db, &user_id).await?;
    Ok(json_list(teams))
}

async fn add_team_member(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(team_id): Path<String>,
    Json(req): Json<MemberRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    add_member(&state.db, &team_id, &user_id, &req.user_id).await?;
    Ok(Json(serde_json::json!({"success": true})))
}

async fn remove_team_member(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((team_id, member_id)): Path<(String, String)>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    remove_member(&state.db, &team_id, &user_id, &member_id).await?;
    Ok(Json(serde_json::json!({"success": true})))
}

async fn share_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(team_id): Path<String>,
    Json(req): Json<ShareFileRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    let share = share_file_to_team(&state.db, &team_id, &user_id, &req.file_id).await?;
    Ok(json_response(&share))
}

async fn team_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(team_id): Path<String>,
) -> AppResult<Json<Vec<serde_json::Value>>> {
    let user_id = require_user(&headers)?;
    let files = list_team_files(&state.db, &team_id, &user_id).await?;
    Ok(json_list(
        files.into_iter().map(FileResponse::from).collect(),
    ))
}

async fn unshare_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((team_id, share_id)): Path<(String, String)>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    remove_team_share(&state.db, &team_id, &user_id, &share_id).await?;
    Ok(Json(serde_json::json!({"success": true})))
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(create))
        .route("/", get(list_teams))
        .route("/:team_id/members", post(add_team_member))
        .route("/:team_id/members/:member_id", delete(remove_team_member))
        .route("/:team_id/files", post(share_file))
        .route("/:team_id/files", get(team_files))
        .route("/:team_id/shares/:share_id", delete(unshare_file))
        .with_state(state)
}
