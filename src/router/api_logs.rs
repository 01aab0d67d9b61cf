use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::PicbedError;
use crate::reqlog::{filter_common, AccessEntry, ForwardEntry, LogQuery};
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/logs", get(list_access).delete(clear_access))
        .route("/api/logs/:id", get(get_access))
        .route("/api/forward/logs", get(list_forward).delete(clear_forward))
        .route("/api/forward/logs/:id", get(get_forward))
}

/// `stats` always covers the whole log while `logs` is the filtered view;
/// `filtered` is how many entries matched before the limit was applied.
async fn list_access(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Json<Value> {
    let mut filtered = filter_common(state.access_log.snapshot(), &query);

    if let Some(collection) = query.collection.as_deref().filter(|c| *c != "all") {
        let needle = format!("/{collection}");
        filtered.retain(|e: &AccessEntry| e.path.contains(&needle));
    }

    let matched = filtered.len();
    filtered.truncate(query.limit());

    Json(json!({
        "logs": filtered,
        "stats": state.access_log.stats(),
        "filtered": matched,
    }))
}

async fn get_access(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AccessEntry>, PicbedError> {
    state
        .access_log
        .get(&id)
        .map(Json)
        .ok_or_else(|| PicbedError::NotFound("log entry not found".to_string()))
}

async fn clear_access(State(state): State<AppState>) -> Json<Value> {
    let count = state.access_log.clear();
    Json(json!({ "message": "logs cleared", "count": count }))
}

async fn list_forward(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Json<Value> {
    let mut filtered = filter_common(state.forward_log.snapshot(), &query);

    if let Some(mode) = query.mode.as_deref().filter(|m| *m != "all") {
        filtered.retain(|e: &ForwardEntry| e.forward_mode.to_string() == mode);
    }

    if let Some(rule_id) = query.rule_id.as_deref().filter(|r| *r != "all") {
        filtered.retain(|e: &ForwardEntry| e.rule_id == rule_id);
    }

    let matched = filtered.len();
    filtered.truncate(query.limit());

    let stats = state.forward_log.stats();

    // Per-mode counts only make sense for this instance, so they ride on top
    // of the shared aggregates.
    let mut modes =
        BTreeMap::from([("redirect".to_string(), 0usize), ("proxy".to_string(), 0usize)]);
    for entry in state.forward_log.snapshot() {
        *modes.entry(entry.forward_mode.to_string()).or_default() += 1;
    }

    Json(json!({
        "logs": filtered,
        "stats": {
            "total": stats.total,
            "success": stats.success,
            "error": stats.error,
            "methods": stats.methods,
            "modes": modes,
        },
        "filtered": matched,
    }))
}

async fn get_forward(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ForwardEntry>, PicbedError> {
    state
        .forward_log
        .get(&id)
        .map(Json)
        .ok_or_else(|| PicbedError::NotFound("log entry not found".to_string()))
}

async fn clear_forward(State(state): State<AppState>) -> Json<Value> {
    let count = state.forward_log.clear();
    Json(json!({ "message": "forward logs cleared", "count": count }))
}
