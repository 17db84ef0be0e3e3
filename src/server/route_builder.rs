use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::AppState;
use crate::database;
use crate::utils::jwt::JwtService;

static PROXY_CLIENT: Lazy<Client<HttpConnector, Body>> =
    Lazy::new(|| Client::builder(TokioExecutor::new()).build_http());

fn dashboard_base() -> String {
    std::env::var("DASHBOARD_PROXY_URL").unwrap_or_else(|_| {
        let port = std::env::var("DASHBOARD_PORT").unwrap_or_else(|_| "3001".to_string());
        format!("http://127.0.0.1:{}", port)
    })
}

/// Rewrites the request to point at the dashboard frontend, preserving path
/// and query and fixing up the Host header.
fn rewrite_for_dashboard(req: &mut Request, base: &str) -> Result<(), String> {
    let base_uri = base
        .parse::<hyper::Uri>()
        .map_err(|e| format!("invalid dashboard URL {}: {}", base, e))?;

    let path_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let target = format!("{}{}", base, path_query);
    *req.uri_mut() = target
        .parse()
        .map_err(|e| format!("failed to parse URI {}: {}", target, e))?;

    if let Some(host) = base_uri.host() {
        let host_value = match base_uri.port_u16() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        if let Ok(header_value) = host_value.parse() {
            req.headers_mut().insert(hyper::header::HOST, header_value);
        }
    }

    Ok(())
}

/// Anything that is not an API route falls through to the dashboard frontend.
async fn proxy_to_dashboard(mut req: Request) -> Response {
    let base = dashboard_base();

    if let Err(e) = rewrite_for_dashboard(&mut req, &base) {
        tracing::error!("Proxy misconfigured: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Invalid proxy configuration").into_response();
    }

    match PROXY_CLIENT.request(req).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            tracing::error!("Proxy error: {}", e);
            (StatusCode::BAD_GATEWAY, "Dashboard not available").into_response()
        }
    }
}

pub async fn register_routes() -> Router {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://droplink.db?mode=rwc".to_string());

    let db = database::create_pool(&database_url)
        .await
        .expect("Failed to create database pool");

    tracing::info!("Database connected and migrations applied");

    let jwt_service = Arc::new(JwtService::from_env().expect("Failed to initialize JWT service"));
    let ws_manager = Arc::new(crate::websocket::connection::ConnectionManager::new());

    crate::tasks::cleanup::start_cleanup_task(db.clone(), ws_manager.clone());
    tracing::info!("File expiry task started");

    let state = Arc::new(AppState {
        db,
        jwt_service,
        ws_manager,
    });

    let api_routes = crate::api::routes(state);

    // Uploads arrive base64-encoded, so the body cap sits above the raw
    // 100 MB file limit.
    Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(140 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .fallback(proxy_to_dashboard)
}
