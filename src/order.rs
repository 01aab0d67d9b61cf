use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, warn};

/// Persisted display order of collections, stored as a JSON array of names.
///
/// The file is the single source of truth for relative ordering but never for
/// existence: readers merge it against the live directory listing and stale
/// entries are dropped lazily (see [`merge_order`]). Read-modify-write
/// sections are serialized so concurrent mutations cannot lose entries.
#[derive(Debug, Clone)]
pub struct OrderStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl OrderStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// A missing or malformed order file is an empty order, never an error.
    pub async fn load(&self) -> Vec<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(order) => order,
                Err(e) => {
                    warn!("Malformed order file {}: {e}", self.path.display());
                    vec![]
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => vec![],
            Err(e) => {
                warn!("Could not read order file {}: {e}", self.path.display());
                vec![]
            }
        }
    }

    /// Whole-file overwrite. Failures are logged for the operator and
    /// swallowed; ordering is cosmetic state and must not fail a mutation
    /// that already changed the filesystem.
    pub async fn save(&self, order: &[String]) {
        let payload = match serde_json::to_string_pretty(order) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Could not serialize order: {e}");
                return;
            }
        };

        if let Err(e) = tokio::fs::write(&self.path, payload).await {
            error!("Could not write order file {}: {e}", self.path.display());
        }
    }

    /// Append `name` unless already present.
    pub async fn append(&self, name: &str) {
        let _guard = self.lock.lock().await;

        let mut order = self.load().await;
        if !order.iter().any(|n| n == name) {
            order.push(name.to_string());
            self.save(&order).await;
        }
    }

    /// Replace `old` with `new` in place, keeping its position. A name absent
    /// from the order is appended so a renamed collection always ends up
    /// tracked.
    pub async fn rename(&self, old: &str, new: &str) {
        let _guard = self.lock.lock().await;

        let mut order = self.load().await;
        match order.iter().position(|n| n == old) {
            Some(idx) => order[idx] = new.to_string(),
            None => order.push(new.to_string()),
        }
        self.save(&order).await;
    }

    pub async fn remove(&self, name: &str) {
        let _guard = self.lock.lock().await;

        let mut order = self.load().await;
        let before = order.len();
        order.retain(|n| n != name);
        if order.len() != before {
            self.save(&order).await;
        }
    }

    /// Wholesale overwrite from the operator; no validation against existing
    /// collections since the merge heals drift on the next read.
    pub async fn replace(&self, order: &[String]) {
        let _guard = self.lock.lock().await;
        self.save(order).await;
    }
}

/// Merge the persisted order with the live directory listing: persisted
/// entries that still exist keep their relative order, anything new on disk
/// is appended in directory order.
pub fn merge_order(all: &[String], saved: &[String]) -> Vec<String> {
    let mut merged = saved
        .iter()
        .filter(|name| all.contains(name))
        .cloned()
        .collect::<Vec<_>>();

    for name in all {
        if !merged.contains(name) {
            merged.push(name.clone());
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> OrderStore {
        OrderStore::new(dir.path().join("order.json"))
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn merge_keeps_saved_order_and_appends_new() {
        let all = names(&["c", "a", "b"]);
        let saved = names(&["b", "a", "gone"]);

        assert_eq!(merge_order(&all, &saved), names(&["b", "a", "c"]));
    }

    #[test]
    fn merge_is_idempotent() {
        let all = names(&["c", "a", "b"]);
        let merged = merge_order(&all, &names(&["b", "a"]));

        assert_eq!(merge_order(&all, &merged), merged);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store(&dir).load().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("order.json"), "{not json").unwrap();
        assert!(store(&dir).load().await.is_empty());
    }

    #[tokio::test]
    async fn append_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.append("a").await;
        store.append("b").await;
        store.append("a").await;

        assert_eq!(store.load().await, names(&["a", "b"]));
    }

    #[tokio::test]
    async fn rename_keeps_position() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.replace(&names(&["a", "b", "c"])).await;
        store.rename("b", "z").await;

        assert_eq!(store.load().await, names(&["a", "z", "c"]));
    }

    #[tokio::test]
    async fn rename_of_untracked_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.replace(&names(&["a"])).await;
        store.rename("ghost", "z").await;

        assert_eq!(store.load().await, names(&["a", "z"]));
    }

    #[tokio::test]
    async fn remove_drops_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.replace(&names(&["a", "b"])).await;
        store.remove("a").await;

        assert_eq!(store.load().await, names(&["b"]));
    }
}
