pub mod config;
pub mod directory;
pub mod shared;
pub mod tickets;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::shared::state::AppState;

/// Assembles the full application router over shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    tickets::configure_ticket_routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
