use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::hub::CollabHub;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub hub: Arc<CollabHub>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let hub = Arc::new(CollabHub::new(
            settings.hub.clone(),
            settings.rate_limit.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            hub,
            start_time: Instant::now(),
        }
    }
}
