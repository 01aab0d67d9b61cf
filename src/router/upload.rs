use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::PicbedError;
use crate::reqlog::{self, success_status, AccessEntry};
use crate::state::AppState;
use crate::upload::{store_file, Stored};
use crate::files;

/// Matches the original uploader's per-batch file cap.
const MAX_BATCH_FILES: usize = 20;

pub(super) fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/upload/:collection", post(upload_to))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .layer(DefaultBodyLimit::max(state.config.max_file_size))
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    replace: Option<String>,
}

async fn upload_to(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): Query<UploadQuery>,
    multipart: Multipart,
) -> Result<Json<Value>, PicbedError> {
    ingest(state, Some(collection), query, multipart).await
}

/// Same as [`upload_to`] but the collection arrives as a multipart text
/// field, which must precede the file fields.
async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    multipart: Multipart,
) -> Result<Json<Value>, PicbedError> {
    ingest(state, None, query, multipart).await
}

async fn ingest(
    state: AppState,
    collection: Option<String>,
    query: UploadQuery,
    mut multipart: Multipart,
) -> Result<Json<Value>, PicbedError> {
    let replace = query.replace.as_deref() == Some("true");

    let mut collection = collection;
    let mut stored = vec![];
    let mut received = 0usize;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);

        match field_name.as_deref() {
            Some("collection") if collection.is_none() => {
                let name = field.text().await?;
                if !name.trim().is_empty() {
                    collection = Some(name);
                }
            }
            Some("files") => {
                received += 1;
                if received > MAX_BATCH_FILES {
                    return Err(PicbedError::InvalidInput(format!(
                        "at most {MAX_BATCH_FILES} files per upload"
                    )));
                }

                let Some(collection) = collection.as_deref() else {
                    return Err(PicbedError::InvalidInput(
                        "missing collection name".to_string(),
                    ));
                };

                if !files::valid_name(collection) {
                    return Err(PicbedError::InvalidInput(
                        "collection name cannot be empty".to_string(),
                    ));
                }

                let raw_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;

                let dir = state.collections.dir(collection);
                files::ensure_dir(&dir)?;

                if let Stored::Written(filename) = store_file(
                    &dir,
                    &raw_name,
                    content_type.as_deref(),
                    &bytes,
                    replace,
                    &state.config.allowed_types,
                )
                .await?
                {
                    stored.push(json!({
                        "filename": filename,
                        "url": format!("/{collection}/{filename}"),
                    }));
                }
            }
            _ => {}
        }
    }

    let Some(collection) = collection else {
        return Err(PicbedError::InvalidInput(
            "missing collection name".to_string(),
        ));
    };

    // Callers compare `count` against how many files they sent; a shortfall
    // means some were dropped by the MIME gate.
    Ok(Json(json!({
        "collection": collection,
        "count": stored.len(),
        "files": stored,
        "replaced": replace,
    })))
}

/// Record every upload request in the access log once the response is built.
/// The body is buffered to measure the response size; logging must never be
/// able to fail the response itself.
async fn record(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let started = Instant::now();

    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = reqlog::query_map(req.uri());
    let ip = reqlog::client_ip(req.extensions());
    let user_agent = reqlog::user_agent(req.headers());

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.unwrap_or_default();

    state.access_log.append(AccessEntry {
        id: reqlog::entry_id(),
        timestamp: Utc::now(),
        method,
        path,
        query,
        status,
        duration: started.elapsed().as_millis() as u64,
        ip,
        user_agent,
        request_body: None,
        response_size: bytes.len() as u64,
        success: success_status(status),
        is_random: false,
    });

    Response::from_parts(parts, Body::from(bytes))
}
