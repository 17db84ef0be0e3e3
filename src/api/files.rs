use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use base64::Engine;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::{AppState, require_user};
use crate::models::download_event::AccessMethod;
use crate::models::file::{File, FileResponse};
use crate::services::download::{RecordOutcome, record_download};
use crate::services::file_storage::{
    delete_file, get_owned_file, get_public_file, list_user_files, read_file_bytes, rename_file,
    save_file, set_file_locked, set_file_public,
};
use crate::utils::error::{AppError, AppResult};
use crate::utils::helpers::{extract_user_agent, json_list, json_response};
use crate::websocket::events::ServerMessage;

#[derive(Deserialize)]
struct UploadRequest {
    name: String,
    content_type: String,
    data: String,
}

#[derive(Deserialize)]
struct RenameRequest {
    name: String,
}

#[derive(Deserialize)]
struct FlagRequest {
    enabled: bool,
}

async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<UploadRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;

    let data = base64::engine::general_purpose::STANDARD
        .decode(&req.data)
        .map_err(|e| AppError::BadRequest(format!("Invalid base64: {}", e)))?;

    let file = save_file(&state.db, &user_id, req.name, req.content_type, data).await?;

    Ok(json_response(&FileResponse::from(file)))
}

/// Serves the bytes and records the event. The event write is best-effort:
/// a recording failure never takes the download away from the user.
pub(crate) async fn serve_file(
    state: &AppState,
    file: &File,
    method: AccessMethod,
    ip: Option<String>,
    user_agent: String,
) -> AppResult<impl IntoResponse + use<>> {
    let contents = read_file_bytes(file).await?;

    match record_download(&state.db, file, None, method, ip, user_agent).await {
        Ok(RecordOutcome::Recorded(_)) => {
            state
                .ws_manager
                .broadcast(ServerMessage::DownloadRecorded {
                    owner_id: file.owner_id.clone(),
                    file_id: file.id.clone(),
                    download_count: file.download_count + 1,
                    download_method: method.as_str().to_string(),
                })
                .await;
        }
        Ok(RecordOutcome::LimitExhausted) => {
            // Unreachable without a link, but do not fail the download.
        }
        Err(e) => {
            tracing::warn!("Failed to record download for file {}: {}", file.id, e);
        }
    }

    let content_disposition = format!("attachment; filename=\"{}\"", file.original_name);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type.clone()),
            (header::CONTENT_DISPOSITION, content_disposition),
        ],
        contents,
    ))
}

async fn download_own(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user(&headers)?;
    let file = get_owned_file(&state.db, &file_id, &user_id).await?;

    serve_file(
        &state,
        &file,
        AccessMethod::Direct,
        Some(addr.ip().to_string()),
        extract_user_agent(&headers),
    )
    .await
}

async fn download_public(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let file = get_public_file(&state.db, &file_id).await?;

    serve_file(
        &state,
        &file,
        AccessMethod::Direct,
        Some(addr.ip().to_string()),
        extract_user_agent(&headers),
    )
    .await
}

async fn list_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<serde_json::Value>>> {
    let user_id = require_user(&headers)?;
    let files = list_user_files(&state.db, &user_id).await?;
    Ok(json_list(
        files.into_iter().map(FileResponse::from).collect(),
    ))
}

async fn rename(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    let file = rename_file(&state.db, &file_id, &user_id, req.name).await?;
    Ok(json_response(&FileResponse::from(file)))
}

async fn set_public(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
    Json(req): Json<FlagRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    set_file_public(&state.db, &file_id, &user_id, req.enabled).await?;
    Ok(Json(serde_json::json!({"success": true})))
}

async fn set_locked(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
    Json(req): Json<FlagRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    set_file_locked(&state.db, &file_id, &user_id, req.enabled).await?;
    Ok(Json(serde_json::json!({"success": true})))
}

async fn remove_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    delete_file(&state.db, &file_id, &user_id).await?;
    Ok(Json(serde_json::json!({"success": true})))
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(upload))
        .route("/", get(list_files))
        .route("/:file_id", delete(remove_file))
        .route("/:file_id/name", put(rename))
        .route("/:file_id/public", put(set_public))
        .route("/:file_id/lock", put(set_locked))
        .route("/:file_id/download", get(download_own))
        .with_state(state)
}

pub fn public_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/:file_id", get(download_public))
        .with_state(state)
}
