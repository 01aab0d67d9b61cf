use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum_macros::debug_handler;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::state::AppState;
use crate::{forward, images};

mod api_collections;
mod api_forward;
mod api_images;
mod api_logs;
mod upload;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    Router::new()
        .merge(api_collections::router())
        .merge(api_images::router())
        .merge(api_logs::router())
        .merge(api_forward::router())
        .merge(upload::router(&state))
        .nest_service("/public", ServeDir::new(&state.config.public_dir))
        .fallback(fallback)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Everything not claimed by an API route: forwarding rules get first pick,
/// then the image routes, then a plain 404. Rules are re-read per request so
/// edits apply immediately, and a broken rules file degrades to "no rules"
/// instead of taking the image routes down with it.
#[debug_handler]
async fn fallback(State(state): State<AppState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();

    let rules = state.rules.load().await;
    if let Some(rule) = forward::match_rule(&rules, parts.uri.path()) {
        return forward::dispatch(&state, rule, parts, body).await;
    }

    if let Some(response) = images::serve(&state, &parts).await {
        return response;
    }

    StatusCode::NOT_FOUND.into_response()
}
