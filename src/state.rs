use std::sync::Arc;

use crate::config::Config;
use crate::service::MarkerService;
use crate::store::{JsonFileStore, RecordStore};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub markers: Arc<MarkerService>,
    pub development: bool,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, development: bool) -> Self {
        Self {
            markers: Arc::new(MarkerService::new(store)),
            development,
        }
    }

    /// State backed by the JSON file named in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(JsonFileStore::new(&config.data_file)),
            config.development,
        )
    }
}
