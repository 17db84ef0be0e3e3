use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::{AppState, require_user};
use crate::services::analytics::{
    ExportRange, Window, comparison_for_owner, events_to_csv, events_to_json, heatmap_for_owner,
    load_events_for_export, series_for_owner, summary_for_owner,
};
use crate::utils::error::{AppError, AppResult};
use crate::utils::helpers::json_response;

#[derive(Deserialize)]
struct SeriesQuery {
    window: Option<String>,
}

#[derive(Deserialize)]
struct ExportQuery {
    format: Option<String>,
    range: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

async fn series(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SeriesQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;

    let window = match query.window.as_deref() {
        None => Window::Last24Hours,
        Some(raw) => Window::parse(raw)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown window: {}", raw)))?,
    };

    let buckets = series_for_owner(&state.db, &user_id, window).await?;
    Ok(json_response(&buckets))
}

async fn heatmap(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    let cells = heatmap_for_owner(&state.db, &user_id).await?;
    Ok(json_response(&cells))
}

async fn summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    let summary = summary_for_owner(&state.db, &user_id).await?;
    Ok(json_response(&summary))
}

async fn comparison(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&headers)?;
    let report = comparison_for_owner(&state.db, &user_id).await?;
    Ok(json_response(&report))
}

fn parse_timestamp(raw: &str, name: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| AppError::BadRequest(format!("Invalid {} timestamp", name)))
}

fn parse_range(query: &ExportQuery) -> AppResult<ExportRange> {
    match query.range.as_deref() {
        None | Some("7d") => Ok(ExportRange::Last7Days),
        Some("30d") => Ok(ExportRange::Last30Days),
        Some("all") => Ok(ExportRange::AllTime),
        Some("custom") => {
            let start = query
                .start
                .as_deref()
                .ok_or_else(|| AppError::BadRequest("Custom range needs a start".to_string()))?;
            let end = query
                .end
                .as_deref()
                .ok_or_else(|| AppError::BadRequest("Custom range needs an end".to_string()))?;

            let start = parse_timestamp(start, "start")?;
            let end = parse_timestamp(end, "end")?;

            if end < start {
                return Err(AppError::BadRequest(
                    "Range end must not precede its start".to_string(),
                ));
            }

            Ok(ExportRange::Custom { start, end })
        }
        Some(other) => Err(AppError::BadRequest(format!("Unknown range: {}", other))),
    }
}

async fn export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ExportQuery>,
) -> AppResult<impl IntoResponse> {
    let user_id = require_user(&headers)?;
    let range = parse_range(&query)?;

    let events = load_events_for_export(&state.db, &user_id, range).await?;

    let (body, content_type, file_name) = match query.format.as_deref() {
        None | Some("csv") => (
            events_to_csv(&events),
            "text/csv",
            "download-events.csv",
        ),
        Some("json") => (
            events_to_json(&events)?,
            "application/json",
            "download-events.json",
        ),
        Some(other) => {
            return Err(AppError::BadRequest(format!("Unknown format: {}", other)));
        }
    };

    tracing::info!(
        "Export generated: user={}, events={}, file={}",
        user_id,
        events.len(),
        file_name
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    ))
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/series", get(series))
        .route("/heatmap", get(heatmap))
        .route("/summary", get(summary))
        .route("/comparison", get(comparison))
        .route("/export", get(export))
        .with_state(state)
}
