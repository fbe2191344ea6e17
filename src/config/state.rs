// Application state module
// Shared by every connection of the running server

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::types::Config;
use crate::cache::{CacheError, CacheHandler};
use crate::upstream::Responder;

/// Application state
pub struct AppState {
    pub config: Config,
    pub handler: Arc<CacheHandler>,

    // Cached config values for fast access without locks
    pub cached_access_log: Arc<AtomicBool>,
}

impl AppState {
    /// Build the cache front for `responder` from `config`
    pub fn new(config: &Config, responder: Arc<dyn Responder>) -> Result<Self, CacheError> {
        let handler = CacheHandler::with_defaults(config.cache.clone(), responder)?;

        Ok(Self {
            config: config.clone(),
            handler: Arc::new(handler),
            cached_access_log: Arc::new(AtomicBool::new(config.logging.access_log)),
        })
    }
}
