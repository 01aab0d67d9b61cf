use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{ConnectInfo, Query};
use axum::http::{header, Extensions, HeaderMap, Uri};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::ForwardMode;

/// The fields shared by every auditable event, enough for the common filters
/// and the aggregate stats.
pub trait Record: Clone {
    fn id(&self) -> &str;
    fn timestamp(&self) -> DateTime<Utc>;
    fn method(&self) -> &str;
    fn success(&self) -> bool;
}

/// Entry recorded for uploads and image fetches.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub status: u16,
    /// Milliseconds from request start to completion.
    pub duration: u64,
    pub ip: String,
    pub user_agent: String,
    pub request_body: Option<serde_json::Value>,
    pub response_size: u64,
    pub success: bool,
    /// Whether this fetch was reached through the random-pick redirect.
    pub is_random: bool,
}

impl Record for AccessEntry {
    fn id(&self) -> &str {
        &self.id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn success(&self) -> bool {
        self.success
    }
}

/// Entry recorded for every request claimed by a forwarding rule.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    /// Path as the client requested it.
    pub source_path: String,
    pub query: BTreeMap<String, String>,
    /// Fully computed destination.
    pub target_url: String,
    pub forward_mode: ForwardMode,
    pub rule_name: String,
    pub rule_id: String,
    pub status: u16,
    pub duration: u64,
    pub ip: String,
    pub user_agent: String,
    pub request_body: Option<serde_json::Value>,
    pub response_size: u64,
    pub success: bool,
    pub error_message: Option<String>,
}

impl Record for ForwardEntry {
    fn id(&self) -> &str {
        &self.id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn success(&self) -> bool {
        self.success
    }
}

pub fn success_status(status: u16) -> bool {
    (200..400).contains(&status)
}

pub fn entry_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn query_map(uri: &Uri) -> BTreeMap<String, String> {
    Query::<BTreeMap<String, String>>::try_from_uri(uri)
        .map(|q| q.0)
        .unwrap_or_default()
}

pub fn client_ip(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_default()
}

pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// A request body is only worth recording when it is a non-empty JSON
/// object; anything else logs as null.
pub fn json_body(bytes: &[u8]) -> Option<serde_json::Value> {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .ok()
        .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
}

/// Aggregates over the entire log, regardless of any filter applied to the
/// returned list. The UI pairs global health with a filtered detail view.
#[derive(Debug, Serialize)]
pub struct LogStats {
    pub total: usize,
    pub success: usize,
    pub error: usize,
    pub methods: BTreeMap<String, usize>,
}

/// Query-string filters accepted by both log endpoints. Fields that do not
/// apply to an instance are simply never matched against.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub limit: Option<usize>,
    pub method: Option<String>,
    pub status: Option<String>,
    pub collection: Option<String>,
    pub mode: Option<String>,
    pub rule_id: Option<String>,
    pub time_range: Option<String>,
}

pub const DEFAULT_LOG_LIMIT: usize = 50;

impl LogQuery {
    pub fn limit(&self) -> usize {
        match self.limit {
            Some(0) | None => DEFAULT_LOG_LIMIT,
            Some(limit) => limit,
        }
    }
}

/// In-memory, newest-first event store with a fixed capacity.
///
/// Two independent instances exist at runtime, one for uploads and image
/// fetches and one for forwarded requests. Entries are never persisted; a
/// restart or an explicit clear empties the log.
#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    entries: Arc<Mutex<VecDeque<T>>>,
    capacity: usize,
}

impl<T: Record> BoundedLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
        }
    }

    /// Insert at the front, evicting the oldest entry past capacity.
    pub fn append(&self, entry: T) {
        let mut entries = self.entries.lock().unwrap();
        entries.push_front(entry);
        while entries.len() > self.capacity {
            entries.pop_back();
        }
    }

    /// Newest-first copy of the whole log.
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    /// Linear scan; the log is small and bounded.
    pub fn get(&self, id: &str) -> Option<T> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id() == id)
            .cloned()
    }

    /// Drop everything, returning how many entries were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn stats(&self) -> LogStats {
        let entries = self.entries.lock().unwrap();

        let mut methods: BTreeMap<String, usize> = BTreeMap::new();
        let mut success = 0;

        for entry in entries.iter() {
            *methods.entry(entry.method().to_string()).or_default() += 1;
            if entry.success() {
                success += 1;
            }
        }

        LogStats {
            total: entries.len(),
            success,
            error: entries.len() - success,
            methods,
        }
    }
}

/// Apply the instance-independent filters: time range, method, status class.
/// Relative order is preserved; instance-specific filters are layered on by
/// the caller.
pub fn filter_common<T: Record>(entries: Vec<T>, query: &LogQuery) -> Vec<T> {
    let mut filtered = entries;

    if let Some(range) = query.time_range.as_deref() {
        if range != "all" {
            if let Ok(hours) = range.parse::<i64>() {
                let cutoff = Utc::now() - Duration::hours(hours);
                filtered.retain(|e| e.timestamp() >= cutoff);
            }
        }
    }

    if let Some(method) = query.method.as_deref() {
        if method != "all" {
            filtered.retain(|e| e.method().eq_ignore_ascii_case(method));
        }
    }

    match query.status.as_deref() {
        Some("success") => filtered.retain(|e| e.success()),
        Some("error") => filtered.retain(|e| !e.success()),
        _ => {}
    }

    filtered
}
