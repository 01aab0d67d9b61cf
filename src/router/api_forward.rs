use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::error::PicbedError;
use crate::rules::RuleDraft;
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/forward/rules", get(list).post(create))
        .route("/api/forward/rules/:id", axum::routing::put(update).delete(remove))
}

async fn list(State(state): State<AppState>) -> Json<serde_json::Value> {
    let rules = state.rules.load().await;
    Json(json!({ "ok": true, "rules": rules }))
}

async fn create(
    State(state): State<AppState>,
    draft: Result<Json<RuleDraft>, JsonRejection>,
) -> Response {
    let Ok(Json(draft)) = draft else {
        return envelope_error(StatusCode::BAD_REQUEST, "malformed JSON body".to_string());
    };

    match state.rules.create(draft).await {
        Ok(rule) => Json(json!({ "ok": true, "rule": rule })).into_response(),
        Err(e) => rule_error(e),
    }
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    draft: Result<Json<RuleDraft>, JsonRejection>,
) -> Response {
    let Ok(Json(draft)) = draft else {
        return envelope_error(StatusCode::BAD_REQUEST, "malformed JSON body".to_string());
    };

    match state.rules.update(&id, draft).await {
        Ok(rule) => Json(json!({ "ok": true, "rule": rule })).into_response(),
        Err(e) => rule_error(e),
    }
}

async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.rules.remove(&id).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => rule_error(e),
    }
}

/// The rule endpoints wrap every response in the `{ok, ...}` envelope, so
/// their failures cannot reuse the bare error body.
fn rule_error(e: PicbedError) -> Response {
    let status = match &e {
        PicbedError::NotFound(_) => StatusCode::NOT_FOUND,
        PicbedError::InvalidInput(_) | PicbedError::Conflict(_) | PicbedError::Json(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    envelope_error(status, e.to_string())
}

fn envelope_error(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "ok": false, "error": message }))).into_response()
}
