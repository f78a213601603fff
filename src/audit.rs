//! Fire-and-forget activity log.
//!
//! Every notable pipeline event gets an append-only row. Writes are spawned
//! and best-effort: a failed insert is logged at debug and swallowed, so the
//! sink can never abort or slow the pipeline. Nothing reads it for control
//! decisions.

use crate::store::postgres::PgStore;

pub mod event {
    pub const CAMPAIGN_CREATED: &str = "campaign_created";
    pub const RECIPIENTS_RESOLVED: &str = "recipients_resolved";
    pub const NO_RECIPIENTS: &str = "no_recipients";
    pub const PROVIDER_SUCCEEDED: &str = "provider_succeeded";
    pub const PROVIDER_FAILED: &str = "provider_failed";
    pub const TOKEN_REGISTERED: &str = "token_registered";
    pub const TOKEN_DEACTIVATED: &str = "token_deactivated";
}

#[derive(Clone)]
pub struct ActivityLog {
    store: PgStore,
}

impl ActivityLog {
    pub fn new(store: PgStore) -> Self {
        Self { store }
    }

    pub fn record(&self, event: &'static str, detail: serde_json::Value) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.insert_activity(event, detail).await {
                tracing::debug!(event, "activity log write failed: {}", e);
            }
        });
    }
}
