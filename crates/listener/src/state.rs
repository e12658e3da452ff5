use std::sync::Arc;

use sync_engine_adapters::SyncEngine;

#[derive(Clone)]
pub struct ListenerState {
    pub engine: Arc<SyncEngine>,
    /// `None` means webhooks are not configured — every webhook request
    /// fails closed with 401 rather than skipping verification.
    pub webhook_secret: Option<String>,
}

impl ListenerState {
    pub fn new(engine: Arc<SyncEngine>, webhook_secret: Option<String>) -> Self {
        if webhook_secret.is_none() {
            tracing::warn!("WEBHOOK_SECRET not configured; webhook endpoint will reject all requests");
        }
        Self { engine, webhook_secret }
    }
}
