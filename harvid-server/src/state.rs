use std::{path::PathBuf, sync::Arc};

use harvid_core::Coordinator;

use crate::config::Config;

/// Shared `axum` state: the coordinator plus the bits of config a handler
/// needs on every request. Cheaply cloneable (everything behind an `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub docroot: Arc<PathBuf>,
    pub admin: bool,
    pub no_index: bool,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            coordinator: Coordinator::new(
                config.pool_size,
                config.idle_decoder_cap,
                config.cache_max_bytes(),
            ),
            docroot: Arc::new(config.docroot.clone()),
            admin: config.admin,
            no_index: config.no_index,
        }
    }
}
