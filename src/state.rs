use std::sync::Arc;

use crate::collection::Collections;
use crate::config::Config;
use crate::error::PicbedError;
use crate::files;
use crate::order::OrderStore;
use crate::reqlog::{AccessEntry, BoundedLog, ForwardEntry};
use crate::rules::RuleStore;

/// Everything a handler needs, cheap to clone per request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    pub collections: Collections,

    pub rules: RuleStore,

    /// Uploads and image fetches.
    pub access_log: BoundedLog<AccessEntry>,

    /// Requests claimed by forwarding rules.
    pub forward_log: BoundedLog<ForwardEntry>,

    /// Shared upstream client for proxy-mode rules. Redirects from the
    /// upstream are surfaced to the client as-is, never chased.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, PicbedError> {
        files::ensure_dir(&config.public_dir)?;
        files::ensure_dir(&config.upload_dir)?;

        let order = OrderStore::new(config.order_file.clone());
        let collections = Collections::new(config.upload_dir.clone(), order);
        let rules = RuleStore::new(config.rules_file.clone());

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            access_log: BoundedLog::new(config.max_logs),
            forward_log: BoundedLog::new(config.max_logs),
            config: Arc::new(config),
            collections,
            rules,
            http,
        })
    }
}
