//! Shared application state.

use std::sync::Arc;

use ledgerbank_ledger::store::{MemoryStore, PgStore, StoreResult};
use ledgerbank_ledger::{AccountStore, EngineMetrics, LedgerEngine, Registry};
use tracing::info;

use crate::config::{ServerConfig, StoreBackend};

/// Everything a request handler needs.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LedgerEngine>,
    pub registry: Arc<dyn Registry>,
    pub store: Arc<dyn AccountStore>,
    pub config: ServerConfig,
}

impl AppState {
    /// Wire the engine and registry to one store.
    pub fn with_store<S>(store: S, config: ServerConfig) -> Self
    where
        S: AccountStore + Registry + 'static,
    {
        let store = Arc::new(store);
        let engine = LedgerEngine::new(store.clone());

        Self {
            engine: Arc::new(engine),
            registry: store.clone(),
            store,
            config,
        }
    }

    /// Open the store selected by the configuration.
    pub async fn from_config(config: ServerConfig) -> StoreResult<Self> {
        match config.store {
            StoreBackend::Memory => {
                info!("Using in-memory account store");
                let store = MemoryStore::with_lock_timeout(config.lock_timeout);
                Ok(Self::with_store(store, config))
            }
            StoreBackend::Postgres => {
                let store = PgStore::connect(&config.pg_store_config()).await?;
                store.migrate().await?;
                Ok(Self::with_store(store, config))
            }
        }
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        self.engine.metrics()
    }
}
