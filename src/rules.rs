use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::PicbedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    Redirect,
    Proxy,
}

impl fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardMode::Redirect => write!(f, "redirect"),
            ForwardMode::Proxy => write!(f, "proxy"),
        }
    }
}

/// A declarative mapping from a request path prefix to a target URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub mode: ForwardMode,

    /// Path prefix this rule claims; unique across all rules.
    pub source: String,

    /// Absolute URL the suffix is appended to.
    pub target: String,

    #[serde(default = "default_keep_query")]
    pub keep_query: bool,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_keep_query() -> bool {
    true
}

impl Rule {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "unnamed rule"
        } else {
            &self.name
        }
    }
}

/// Incoming rule payload for create and update. `source` and `target` are
/// validated at the store since both operations require them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDraft {
    #[serde(default)]
    pub name: String,

    pub mode: Option<ForwardMode>,

    pub source: Option<String>,

    pub target: Option<String>,

    pub keep_query: Option<bool>,
}

impl RuleDraft {
    fn required(&self) -> Result<(&str, &str), PicbedError> {
        match (self.source.as_deref(), self.target.as_deref()) {
            (Some(source), Some(target)) if !source.is_empty() && !target.is_empty() => {
                Ok((source, target))
            }
            _ => Err(PicbedError::InvalidInput(
                "source and target are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<Rule>,
}

/// JSON-file-backed forwarding rule set.
///
/// Reads are defensive: a missing or corrupted file means "no rules" so the
/// rest of the server stays reachable. Mutations are serialized with an async
/// mutex around the read-modify-write.
#[derive(Debug, Clone)]
pub struct RuleStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl RuleStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load(&self) -> Vec<Rule> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => match serde_json::from_str::<RulesFile>(&raw) {
                Ok(file) => file.rules,
                Err(e) => {
                    warn!("Malformed rules file {}: {e}", self.path.display());
                    vec![]
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => vec![],
            Err(e) => {
                warn!("Could not read rules file {}: {e}", self.path.display());
                vec![]
            }
        }
    }

    async fn save(&self, rules: Vec<Rule>) -> Result<(), PicbedError> {
        let payload = serde_json::to_string_pretty(&RulesFile { rules })?;
        tokio::fs::write(&self.path, payload).await?;
        Ok(())
    }

    pub async fn create(&self, draft: RuleDraft) -> Result<Rule, PicbedError> {
        let (source, target) = draft.required()?;

        let _guard = self.lock.lock().await;
        let mut rules = self.load().await;

        if rules.iter().any(|r| r.source == source) {
            return Err(PicbedError::Conflict("source path already exists".to_string()));
        }

        let rule = Rule {
            id: uuid::Uuid::new_v4().to_string(),
            name: draft.name.clone(),
            mode: draft.mode.unwrap_or(ForwardMode::Redirect),
            source: source.to_string(),
            target: target.to_string(),
            keep_query: draft.keep_query.unwrap_or(true),
            created_at: Utc::now(),
            updated_at: None,
        };

        rules.push(rule.clone());
        self.save(rules).await?;

        Ok(rule)
    }

    pub async fn update(&self, id: &str, draft: RuleDraft) -> Result<Rule, PicbedError> {
        let (source, target) = draft.required()?;

        let _guard = self.lock.lock().await;
        let mut rules = self.load().await;

        let idx = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| PicbedError::NotFound("rule not found".to_string()))?;

        // Uniqueness must hold across every rule but the one being edited.
        if rules
            .iter()
            .enumerate()
            .any(|(i, r)| i != idx && r.source == source)
        {
            return Err(PicbedError::Conflict("source path already exists".to_string()));
        }

        let rule = &mut rules[idx];
        rule.name = draft.name.clone();
        rule.mode = draft.mode.unwrap_or(ForwardMode::Redirect);
        rule.source = source.to_string();
        rule.target = target.to_string();
        rule.updated_at = Some(Utc::now());

        let updated = rule.clone();
        self.save(rules).await?;

        Ok(updated)
    }

    pub async fn remove(&self, id: &str) -> Result<(), PicbedError> {
        let _guard = self.lock.lock().await;
        let mut rules = self.load().await;

        let before = rules.len();
        rules.retain(|r| r.id != id);

        if rules.len() == before {
            return Err(PicbedError::NotFound("rule not found".to_string()));
        }

        self.save(rules).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> RuleStore {
        RuleStore::new(dir.path().join("rules.json"))
    }

    fn draft(source: &str, target: &str) -> RuleDraft {
        RuleDraft {
            source: Some(source.to_string()),
            target: Some(target.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_file_means_no_rules() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store(&dir).load().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_file_means_no_rules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rules.json"), "]").unwrap();
        assert!(store(&dir).load().await.is_empty());
    }

    #[tokio::test]
    async fn create_defaults_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let rule = store.create(draft("/api/x", "https://x.dev")).await.unwrap();
        assert_eq!(rule.mode, ForwardMode::Redirect);
        assert!(rule.keep_query);
        assert_eq!(rule.display_name(), "unnamed rule");

        let loaded = store.load().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].source, "/api/x");
    }

    #[tokio::test]
    async fn create_rejects_duplicate_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.create(draft("/api/x", "https://x.dev")).await.unwrap();
        let err = store.create(draft("/api/x", "https://y.dev")).await;

        assert!(matches!(err, Err(PicbedError::Conflict(_))));
    }

    #[tokio::test]
    async fn create_requires_source_and_target() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(&dir).create(RuleDraft::default()).await;

        assert!(matches!(err, Err(PicbedError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn update_excludes_self_from_uniqueness() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let a = store.create(draft("/a", "https://a.dev")).await.unwrap();
        store.create(draft("/b", "https://b.dev")).await.unwrap();

        // Same source as itself is fine.
        let updated = store.update(&a.id, draft("/a", "https://a2.dev")).await.unwrap();
        assert_eq!(updated.target, "https://a2.dev");
        assert!(updated.updated_at.is_some());

        // Colliding with the other rule is not.
        let err = store.update(&a.id, draft("/b", "https://a.dev")).await;
        assert!(matches!(err, Err(PicbedError::Conflict(_))));
    }

    #[tokio::test]
    async fn update_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(&dir).update("nope", draft("/a", "https://a.dev")).await;

        assert!(matches!(err, Err(PicbedError::NotFound(_))));
    }

    #[tokio::test]
    async fn remove_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        store.create(draft("/a", "https://a.dev")).await.unwrap();
        assert!(matches!(
            store.remove("nope").await,
            Err(PicbedError::NotFound(_))
        ));

        let a = store.load().await.remove(0);
        store.remove(&a.id).await.unwrap();
        assert!(store.load().await.is_empty());
    }
}
