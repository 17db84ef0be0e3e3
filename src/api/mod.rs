pub mod account;
pub mod analytics;
pub mod auth;
pub mod files;
pub mod shares;
pub mod teams;

use axum::Router;
use axum::http::HeaderMap;
use std::sync::Arc;

use crate::utils::error::{AppError, AppResult};

pub use auth::AppState;

pub(crate) fn require_user(headers: &HeaderMap) -> AppResult<String> {
    crate::utils::helpers::extract_user_id(headers)
        .ok_or_else(|| AppError::Auth("Not authenticated".to_string()))
}

pub fn routes(state: Arc<AppState>) -> Router {
    let ws_route = Router::new()
        .route(
            "/ws",
            axum::routing::get(crate::websocket::handlers::ws_handler),
        )
        .with_state(state.clone());

    let protected_routes = Router::new()
        .nest("/files", files::routes(state.clone()))
        .nest("/shares", shares::routes(state.clone()))
        .nest("/analytics", analytics::routes(state.clone()))
        .nest("/account", account::routes(state.clone()))
        .nest("/teams", teams::routes(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(ws_route)
        .nest("/auth", auth::routes(state.clone()))
        .nest("/share", shares::public_routes(state.clone()))
        .nest("/downloads", files::public_routes(state.clone()))
        .merge(protected_routes)
}
