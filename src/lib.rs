// Library exports for the API server, the reconcile tool and tests
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use services::lifecycle::LifecycleService;
use services::store::LifecycleStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LifecycleStore>,
    pub lifecycle: Arc<LifecycleService>,
}

impl AppState {
    pub fn new(lifecycle: Arc<LifecycleService>) -> Self {
        Self {
            store: lifecycle.store().clone(),
            lifecycle,
        }
    }
}
