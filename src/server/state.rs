use crate::cache::CacheIndex;
use crate::config::AppConfig;
use crate::jobs::JobStore;
use crate::metrics::Metrics;
use crate::router_driver::RouterDriver;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared process state, cheaply cloneable — handed to every HTTP handler.
///
/// `config` is read once at boot and never mutated afterwards; per-request
/// overrides flow exclusively through `RunOptions`, never back into this
/// struct.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub metrics: Metrics,
    pub cache: CacheIndex,
    pub jobs: Arc<JobStore>,
    pub driver: Arc<dyn RouterDriver>,
    pub data_dir: PathBuf,
}
