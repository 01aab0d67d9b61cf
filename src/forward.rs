use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::http::{header, request::Parts, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::{error, info};

use crate::reqlog::{self, success_status, ForwardEntry};
use crate::rules::{ForwardMode, Rule};
use crate::state::AppState;

/// Response headers that would conflict with the local server's own framing
/// and are therefore not relayed from the upstream.
const SKIP_RESPONSE_HEADERS: [&str; 3] = ["transfer-encoding", "connection", "keep-alive"];

/// First rule claiming the path wins. A rule claims a path when it equals the
/// source or continues it at a `/` boundary. List order is the only
/// tie-break; operators order rules deliberately, so no longest-prefix logic.
pub fn match_rule<'a>(rules: &'a [Rule], path: &str) -> Option<&'a Rule> {
    rules
        .iter()
        .find(|r| path == r.source || path.strip_prefix(&r.source).is_some_and(|s| s.starts_with('/')))
}

/// Destination: target, then the path beyond the matched prefix, then the
/// query string as received.
pub fn target_url(rule: &Rule, path: &str, raw_query: Option<&str>) -> String {
    let suffix = &path[rule.source.len()..];

    match raw_query {
        Some(query) if !query.is_empty() => format!("{}{}?{}", rule.target, suffix, query),
        _ => format!("{}{}", rule.target, suffix),
    }
}

/// Handle a request already matched to `rule`: redirect or relay, then
/// record the outcome in the forward log.
pub async fn dispatch(state: &AppState, rule: &Rule, parts: Parts, body: Body) -> Response<Body> {
    let started = Instant::now();

    let path = parts.uri.path().to_string();
    let target = target_url(rule, &path, parts.uri.query());

    info!("{} {} -> {}", parts.method, path, target);

    match rule.mode {
        ForwardMode::Redirect => {
            let Ok(location) = HeaderValue::try_from(target.as_str()) else {
                error!("Unusable redirect target: {target}");
                return forward_failure();
            };

            // Logged before the redirect is sent; a redirect carries no body.
            state.forward_log.append(entry(
                rule, &parts, &target, 302, started, 0, None, None,
            ));

            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::FOUND;
            response.headers_mut().insert(header::LOCATION, location);
            response
        }
        ForwardMode::Proxy => {
            let bytes = to_bytes(body, usize::MAX).await.unwrap_or_default();
            let request_body = reqlog::json_body(&bytes);

            match relay(state, &parts, &target, bytes).await {
                Ok((response, status, size)) => {
                    state.forward_log.append(entry(
                        rule,
                        &parts,
                        &target,
                        status,
                        started,
                        size,
                        request_body,
                        None,
                    ));
                    response
                }
                Err(e) => {
                    let status = e.status().map(|s| s.as_u16()).unwrap_or(500);
                    error!("Forward error: {e}");

                    state.forward_log.append(entry(
                        rule,
                        &parts,
                        &target,
                        status,
                        started,
                        0,
                        request_body,
                        Some(e.to_string()),
                    ));

                    forward_failure()
                }
            }
        }
    }
}

/// Relay the request to the upstream and its response back. Upstream
/// redirects are surfaced as-is (the shared client never follows them) and
/// non-2xx statuses are relayed, not raised.
async fn relay(
    state: &AppState,
    parts: &Parts,
    target: &str,
    bytes: axum::body::Bytes,
) -> Result<(Response<Body>, u16, u64), reqwest::Error> {
    let mut headers = parts.headers.clone();
    // reqwest derives Host from the target URL and recomputes the length of
    // the body it is handed.
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    let upstream = state
        .http
        .request(parts.method.clone(), target)
        .headers(headers)
        .body(bytes)
        .send()
        .await?;

    let status = upstream.status();

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    for (name, value) in upstream.headers() {
        if SKIP_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        response.headers_mut().append(name.clone(), value.clone());
    }

    let body = upstream.bytes().await?;
    let size = body.len() as u64;
    *response.body_mut() = Body::from(body);

    Ok((response, status.as_u16(), size))
}

fn forward_failure() -> Response<Body> {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "forward request failed" })),
    )
        .into_response()
}

#[allow(clippy::too_many_arguments)]
fn entry(
    rule: &Rule,
    parts: &Parts,
    target: &str,
    status: u16,
    started: Instant,
    response_size: u64,
    request_body: Option<serde_json::Value>,
    error_message: Option<String>,
) -> ForwardEntry {
    ForwardEntry {
        id: reqlog::entry_id(),
        timestamp: Utc::now(),
        method: parts.method.to_string(),
        source_path: parts.uri.path().to_string(),
        query: reqlog::query_map(&parts.uri),
        target_url: target.to_string(),
        forward_mode: rule.mode,
        rule_name: rule.display_name().to_string(),
        rule_id: rule.id.clone(),
        status,
        duration: started.elapsed().as_millis() as u64,
        ip: reqlog::client_ip(&parts.extensions),
        user_agent: reqlog::user_agent(&parts.headers),
        request_body,
        response_size,
        success: success_status(status),
        error_message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rule(source: &str, target: &str) -> Rule {
        Rule {
            id: uuid::Uuid::new_v4().to_string(),
            name: String::new(),
            mode: ForwardMode::Redirect,
            source: source.to_string(),
            target: target.to_string(),
            keep_query: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn matches_exact_and_boundary_prefix() {
        let rules = vec![rule("/api/a", "https://a.dev")];

        assert!(match_rule(&rules, "/api/a").is_some());
        assert!(match_rule(&rules, "/api/a/x").is_some());
        // No boundary: /api/ab is a different path.
        assert!(match_rule(&rules, "/api/ab").is_none());
        assert!(match_rule(&rules, "/other").is_none());
    }

    #[test]
    fn first_match_wins_over_longer_prefix() {
        let short_first = vec![rule("/api/a", "https://short.dev"), rule("/api/a/b", "https://long.dev")];
        let long_first = vec![rule("/api/a/b", "https://long.dev"), rule("/api/a", "https://short.dev")];

        let hit = match_rule(&short_first, "/api/a/b/x").unwrap();
        assert_eq!(hit.target, "https://short.dev");

        let hit = match_rule(&long_first, "/api/a/b/x").unwrap();
        assert_eq!(hit.target, "https://long.dev");
    }

    #[test]
    fn target_keeps_suffix_and_query() {
        let r = rule("/api/a", "https://a.dev/base");

        assert_eq!(target_url(&r, "/api/a", None), "https://a.dev/base");
        assert_eq!(target_url(&r, "/api/a/x/y", None), "https://a.dev/base/x/y");
        assert_eq!(
            target_url(&r, "/api/a/x", Some("k=v&n=1")),
            "https://a.dev/base/x?k=v&n=1"
        );
        assert_eq!(target_url(&r, "/api/a/x", Some("")), "https://a.dev/base/x");
    }

    #[test]
    fn framing_headers_are_skipped() {
        for name in ["transfer-encoding", "connection", "keep-alive"] {
            assert!(SKIP_RESPONSE_HEADERS.contains(&name));
        }
        assert!(!SKIP_RESPONSE_HEADERS.contains(&"content-type"));
    }
}
