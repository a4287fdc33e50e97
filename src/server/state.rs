use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::connection_manager::ConnectionManager;
use crate::notification::NotificationDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub connection_manager: Arc<ConnectionManager>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let connection_manager = Arc::new(ConnectionManager::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(connection_manager.clone()));

        Self {
            settings: Arc::new(settings),
            connection_manager,
            dispatcher,
            start_time: Instant::now(),
        }
    }
}
