pub mod celery;
pub mod config;
pub mod routes;

use std::sync::Arc;

use reviewsense_core::AnalysisService;

pub struct AppState {
    pub service: Arc<AnalysisService>,
}
