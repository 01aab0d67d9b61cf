use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::collection::CollectionDetail;
use crate::error::PicbedError;
use crate::state::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/collections", get(list))
        .route("/api/collections/-order", post(save_order))
        .route(
            "/api/collections/:collection",
            get(detail).post(create).put(rename).delete(remove),
        )
}

async fn list(State(state): State<AppState>) -> Result<Json<Value>, PicbedError> {
    let collections = state.collections.list().await?;
    Ok(Json(json!({ "collections": collections })))
}

async fn detail(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<Json<CollectionDetail>, PicbedError> {
    Ok(Json(state.collections.detail(&collection).await?))
}

async fn create(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<Json<Value>, PicbedError> {
    state.collections.create(&collection).await?;

    Ok(Json(json!({
        "message": "collection created",
        "collection": collection,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenamePayload {
    new_name: Option<String>,
}

async fn rename(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    payload: Result<Json<RenamePayload>, JsonRejection>,
) -> Result<Json<Value>, PicbedError> {
    let Ok(Json(payload)) = payload else {
        return Err(PicbedError::InvalidInput("malformed JSON body".to_string()));
    };

    let Some(new_name) = payload.new_name.filter(|n| !n.trim().is_empty()) else {
        return Err(PicbedError::InvalidInput(
            "new collection name cannot be empty".to_string(),
        ));
    };

    state.collections.rename(&collection, &new_name).await?;

    Ok(Json(json!({
        "message": "collection renamed",
        "oldName": collection,
        "newName": new_name,
    })))
}

async fn remove(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<Json<Value>, PicbedError> {
    state.collections.delete(&collection).await?;

    Ok(Json(json!({
        "message": "collection deleted",
        "collection": collection,
    })))
}

#[derive(Debug, Deserialize)]
struct OrderPayload {
    order: Vec<String>,
}

async fn save_order(
    State(state): State<AppState>,
    payload: Result<Json<OrderPayload>, JsonRejection>,
) -> Result<Json<Value>, PicbedError> {
    let Ok(Json(payload)) = payload else {
        return Err(PicbedError::InvalidInput(
            "order must be an array of collection names".to_string(),
        ));
    };

    state.collections.save_order(&payload.order).await;

    Ok(Json(json!({
        "message": "order saved",
        "order": payload.order,
    })))
}
