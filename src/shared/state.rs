use std::sync::Arc;

use crate::directory::UserDirectory;
use crate::tickets::service::TicketService;

/// Shared application state handed to every handler.
pub struct AppState {
    pub service: Arc<TicketService>,
    pub directory: Arc<dyn UserDirectory>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("service", &"Arc<TicketService>")
            .field("directory", &"Arc<dyn UserDirectory>")
            .finish()
    }
}
