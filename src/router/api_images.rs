use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::PicbedError;
use crate::state::AppState;
use crate::{files, upload};

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/api/images/check-conflicts/:collection", post(check_conflicts))
        .route("/api/images/:collection/:filename", delete(remove))
}

async fn remove(
    State(state): State<AppState>,
    Path((collection, filename)): Path<(String, String)>,
) -> Result<Json<Value>, PicbedError> {
    if !files::valid_name(&collection) || !files::valid_name(&filename) {
        return Err(PicbedError::NotFound("image not found".to_string()));
    }

    let path = state.collections.dir(&collection).join(&filename);

    if !path.is_file() {
        return Err(PicbedError::NotFound("image not found".to_string()));
    }

    tokio::fs::remove_file(&path).await?;

    Ok(Json(json!({
        "message": "image deleted",
        "filename": filename,
    })))
}

#[derive(Debug, Deserialize)]
struct ConflictPayload {
    filenames: Vec<String>,
}

/// Exact-name pre-check so the client can offer replace/rename/cancel before
/// committing bytes.
async fn check_conflicts(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    payload: Result<Json<ConflictPayload>, JsonRejection>,
) -> Result<Json<Value>, PicbedError> {
    let Ok(Json(payload)) = payload else {
        return Err(PicbedError::InvalidInput(
            "filenames must be an array".to_string(),
        ));
    };

    if !files::valid_name(&collection) {
        return Err(PicbedError::InvalidInput(
            "collection name cannot be empty".to_string(),
        ));
    }

    let dir = state.collections.dir(&collection);
    let conflicts = upload::check_conflicts(&dir, &payload.filenames);

    Ok(Json(json!({ "conflicts": conflicts })))
}
