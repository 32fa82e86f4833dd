use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use logwarden_ingest::MemoryBroker;
use logwarden_storage::SqliteStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    /// Present only with the in-process broker; `POST /v1/logs` publishes here.
    pub memory_broker: Option<Arc<MemoryBroker>>,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<SqliteStore>,
        memory_broker: Option<Arc<MemoryBroker>>,
        config: ServerConfig,
    ) -> Self {
        Self {
            store,
            memory_broker,
            start_time: Utc::now(),
            config: Arc::new(config),
        }
    }
}
