use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::{AppState, require_user};
use crate::models::download_event::AccessMethod;
use crate::models::shared_link::SharedLinkResponse;
use crate::services::access::{
    AccessDecision, DenyReason, validate_code_access, validate_link_access,
};
use crate::services::download::{RecordOutcome, record_download};
use crate::services::file_storage::read_file_bytes;
use crate::services::share::{
    CreateLinkOptions, assign_share_code, clear_share_code, create_share_link,
    deactivate_share_link, find_password_link, list_file_links, resolve_code, resolve_token,
};
use crate::utils::error::{AppError, AppResult};
use crate::utils::helpers::{extract_user_agent, json_list, json_response};
use crate::websocket::events::ServerMessage;

#[derive(Deserialize, Default)]
struct DownloadRequest {
    password: Option<String>,
    /// Emailed links carry `"email"` so the event log can tell them apart.
    source: Option<String>,
}

#[derive(Deserialize)]
struct CodeLookupRequest {
    code: String,
}

#[derive(Serialize)]
struct CodeLookupResponse {
    file_id: String,
    file_name: String,
    content_type: String,
    size: i64,
    requires_password: bool,
}

/// Expired, limit-reached and password failures each get their own message;
/// only resolution failures stay deliberately vague.
fn deny_error(reason: DenyReason) -> AppError {
    match reason {
        DenyReason::Expired | DenyReason::LimitReached => {
            AppError::Forbidden(reason.message().to_string())
        }
        DenyReason::PasswordRequired | DenyReason::InvalidPassword => {
            AppError::Unauthorized(reason.message().to_string())
        }
    }
}

fn link_method(source: Option<&str>) -> AccessMethod {
    match source {
        Some("email") => AccessMethod::Email,
        _ => AccessMethod::Link,
    }
}

async fn share_page(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let resolved = resolve_token(&state.db, &token).await?;

    let response = SharedLinkResponse {
        share_token: resolved.link.share_token.clone(),
        file_name: resolved.file.original_name.clone(),
        content_type: resolved.file.content_type.clone(),
        size: resolved.file.size,
        expires_at: resolved.link.expires_at.clone(),
        download_limit: resolved.link.download_limit,
        download_count: resolved.link.download_count,
        requires_password: resolved.link.has_password() || resolved.file.is_locked == 1,
    };

    Ok(json_response(&response))
}

async fn download_via_token(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(token): Path<String>,
    body: Option<Json<DownloadRequest>>,
) -> AppResult<impl IntoResponse> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let resolved = resolve_token(&state.db, &token).await?;

    let decision = validate_link_access(
        &resolved.link,
        &resolved.file,
        req.password.as_deref(),
        Utc::now(),
    )?;

    if let AccessDecision::Denied(reason) = decision {
        return Err(deny_error(reason));
    }

    let contents = read_file_bytes(&resolved.file).await?;
    let method = link_method(req.source.as_deref());

    match record_download(
        &state.db,
        &resolved.file,
        Some(&resolved.link),
        method,
        Some(addr.ip().to_string()),
        extract_user_agent(&headers),
    )
    .await
    {
        Ok(RecordOutcome::Recorded(_)) => {
            state
                .ws_manager
                .broadcast(ServerMessage::DownloadRecorded {
                    owner_id: resolved.file.owner_id.clone(),
                    file_id: resolved.file.id.clone(),
                    download_count: resolved.file.download_count + 1,
                    download_method: method.as_str().to_string(),
                })
                .await;
        }
        // A concurrent download took the last slot between validation and
        // recording; the conditional update is the boundary that holds.
        Ok(RecordOutcome::LimitExhausted) => {
            return Err(deny_error(DenyReason::LimitReached));
        }
        Err(e) => {
            tracing::warn!(
                "Failed to record link download for file {}: {}",
                resolved.file.id,
                e
            );
        }
    }

    let content_disposition = format!(
        "attachment; filename=\"{}\"",
        resolved.file.original_name
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, resolved.file.content_type.clone()),
            (header::CONTENT_DISPOSITION, content_disposition),
        ],
        contents,
    ))
}

async fn lookup_code(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CodeLookupRequest>,
) -> AppResult<Json<CodeLookupResponse>> {
    let file = resolve_code(&state.db, &req.code).await?;

    Ok(Json(CodeLookupResponse {
        file_id: file.id.clone(),
        file_name: file.original_name.clone(),
        content_type: file.content_type.clone(),
        size: file.size,
        requires_password: file.is_locked == 1,
    }))
}

async fn download_via_code(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(code): Path<String>,
    body: Option<Json<DownloadRequest>>,
) -> AppResult<impl IntoResponse> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let file = resolve_code(&state.db, &code).await?;

    let password_link = if file.is_locked == 1 {
        find_password_link(&state.db, &file.id).await?
    } else {
        None
    };

    let decision = validate_code_access(
        &file,
        password_link.as_ref().and_then(|l| l.password_hash.as_deref()),
        req.password.as_deref(),
    )?;

    if let AccessDecision::Denied(reason) = decision {
        return Err(deny_error(reason));
    }

    crate::api::files::serve_file(
        &state,
        &file,
        AccessMethod::Code,
        Some(addr.ip().to_string()),
        extract_user_agent(&headers),
    )
    .await
}

async fn create_link(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
    Json(options): Json<CreateLinkOptions>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    let link = create_share_link(&state.db, &user_id, &file_id, options).await?;

    Ok(Json(serde_json::json!({
        "id": link.id,
        "share_token": link.share_token,
        "expires_at": link.expires_at,
        "download_limit": link.download_limit,
        "requires_password": link.has_password(),
        "created_at": link.created_at,
    })))
}

async fn list_links(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> AppResult<Json<Vec<serde_json::Value>>> {
    let user_id = require_user(&headers)?;
    let links = list_file_links(&state.db, &user_id, &file_id).await?;

    Ok(json_list(
        links
            .into_iter()
            .map(|link| {
                serde_json::json!({
                    "id": link.id,
                    "share_token": link.share_token,
                    "expires_at": link.expires_at,
                    "download_limit": link.download_limit,
                    "download_count": link.download_count,
                    "requires_password": link.has_password(),
                    "is_active": link.is_active == 1,
                    "created_at": link.created_at,
                })
            })
            .collect(),
    ))
}

async fn deactivate_link(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(link_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    deactivate_share_link(&state.db, &user_id, &link_id).await?;
    Ok(Json(serde_json::json!({"success": true})))
}

async fn assign_code(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    let code = assign_share_code(&state.db, &user_id, &file_id).await?;
    Ok(Json(serde_json::json!({"share_code": code})))
}

async fn remove_code(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(file_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    clear_share_code(&state.db, &user_id, &file_id).await?;
    Ok(Json(serde_json::json!({"success": true})))
}

/// Link and code management, behind auth.
pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/files/:file_id/links", post(create_link))
        .route("/files/:file_id/links", get(list_links))
        .route("/files/:file_id/code", post(assign_code))
        .route("/files/:file_id/code", delete(remove_code))
        .route("/links/:link_id", delete(deactivate_link))
        .with_state(state)
}

/// The public share surface: token pages and downloads, code lookup.
pub fn public_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/code", post(lookup_code))
        .route("/code/:code/download", post(download_via_code))
        .route("/:token", get(share_page))
        .route("/:token/download", post(download_via_token))
        .with_state(state)
}
