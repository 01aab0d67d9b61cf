use std::time::Instant;

use axum::body::Body;
use axum::http::{header, request::Parts, HeaderValue, Response, StatusCode};
use chrono::Utc;
use rand::Rng;
use tracing::error;

use crate::files;
use crate::reqlog::{self, success_status, AccessEntry};
use crate::state::AppState;

/// Requests not claimed by a forwarding rule end up here: a two-segment path
/// is tried as a direct image fetch, a single segment as a random pick.
/// `None` means the path is nobody's business and falls through to a 404.
pub async fn serve(state: &AppState, parts: &Parts) -> Option<Response<Body>> {
    let path = parts.uri.path();
    let segments = path
        .trim_matches('/')
        .split('/')
        .map(decode_segment)
        .collect::<Vec<_>>();

    match segments.as_slice() {
        [collection, filename] => fetch_image(state, parts, collection, filename).await,
        [collection] if !collection.is_empty() => random_pick(state, collection).await,
        _ => None,
    }
}

/// Route parameters arrive percent-encoded in the raw path.
fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// Serve one image file. Completion is recorded in the access log unless the
/// request is a gallery preview, which would flood the log with
/// thumbnail-grid fetches.
async fn fetch_image(
    state: &AppState,
    parts: &Parts,
    collection: &str,
    filename: &str,
) -> Option<Response<Body>> {
    if !files::valid_name(collection) || !files::valid_name(filename) {
        return None;
    }

    if !files::is_image(filename) {
        return None;
    }

    let path = state.collections.dir(collection).join(filename);
    if !path.is_file() {
        return None;
    }

    let started = Instant::now();
    let query = reqlog::query_map(&parts.uri);
    let is_random = query.get("random").map(String::as_str) == Some("1");
    let is_gallery = query.get("gallery").map(String::as_str) == Some("1");

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            if !is_gallery {
                state
                    .access_log
                    .append(entry(parts, 200, started, bytes.len() as u64, is_random));
            }

            let mime = mime_guess::from_path(&path).first_or_octet_stream();

            let mut response = Response::new(Body::from(bytes));
            if let Ok(value) = HeaderValue::try_from(mime.as_ref()) {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            Some(response)
        }
        Err(e) => {
            error!("Could not read {}: {e}", path.display());

            if !is_gallery {
                state
                    .access_log
                    .append(entry(parts, 500, started, 0, is_random));
            }

            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            Some(response)
        }
    }
}

/// Redirect to a uniformly chosen image so the eventual file fetch, not the
/// redirect, is what gets logged.
async fn random_pick(state: &AppState, collection: &str) -> Option<Response<Body>> {
    if !files::valid_name(collection) {
        return None;
    }

    let dir = state.collections.dir(collection);
    if !dir.is_dir() {
        return None;
    }

    let images = files::list_images(&dir).unwrap_or_default();

    if images.is_empty() {
        let mut response = Response::new(Body::from("no images in this collection"));
        *response.status_mut() = StatusCode::NOT_FOUND;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        return Some(response);
    }

    let pick = &images[rand::thread_rng().gen_range(0..images.len())];

    let location = format!(
        "/{}/{}?random=1",
        urlencoding::encode(collection),
        urlencoding::encode(pick)
    );

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    if let Ok(value) = HeaderValue::try_from(location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    Some(response)
}

fn entry(parts: &Parts, status: u16, started: Instant, size: u64, is_random: bool) -> AccessEntry {
    AccessEntry {
        id: reqlog::entry_id(),
        timestamp: Utc::now(),
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: reqlog::query_map(&parts.uri),
        status,
        duration: started.elapsed().as_millis() as u64,
        ip: reqlog::client_ip(&parts.extensions),
        user_agent: reqlog::user_agent(&parts.headers),
        request_body: None,
        response_size: size,
        success: success_status(status),
        is_random,
    }
}
