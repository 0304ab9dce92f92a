use std::sync::Arc;

use crate::config::Config;
use crate::services::{LlmService, SqlGenerator, TableRegistry};
use crate::storage::DuckDbStorage;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<DuckDbStorage>,
    pub config: Config,
    pub registry: Arc<TableRegistry>,
    pub llm: Arc<LlmService>,
}

impl AppState {
    pub fn new(storage: Arc<DuckDbStorage>, config: Config) -> Self {
        let llm = Arc::new(LlmService::from_config(&config.llm));
        Self::with_llm(storage, config, llm)
    }

    /// State whose translations come from `generator` instead of the configured API
    pub fn with_generator(storage: Arc<DuckDbStorage>, config: Config, generator: Arc<dyn SqlGenerator>) -> Self {
        let llm = Arc::new(LlmService::new(generator, config.llm.timeout()));
        Self::with_llm(storage, config, llm)
    }

    fn with_llm(storage: Arc<DuckDbStorage>, config: Config, llm: Arc<LlmService>) -> Self {
        Self {
            storage,
            config,
            registry: Arc::new(TableRegistry::new()),
            llm,
        }
    }
}
