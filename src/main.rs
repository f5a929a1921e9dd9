use std::sync::Arc;

use dotenvy::dotenv;
use log::info;

use ticketserver::config::AppConfig;
use ticketserver::directory::{StaticDirectory, UserRole};
use ticketserver::shared::state::AppState;
use ticketserver::tickets::service::TicketService;
use ticketserver::tickets::store::TicketStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();

    let store = build_store()?;

    // Identity is an external collaborator; until a real directory adapter
    // is wired in, seed a bootstrap admin and print its id for the
    // x-user-id header.
    let directory = Arc::new(StaticDirectory::new());
    let admin = directory.add("admin", "admin@localhost", UserRole::Admin);
    info!("Bootstrap admin user id: {}", admin.id);

    let service = Arc::new(TicketService::new(store, directory.clone()));
    let state = Arc::new(AppState { service, directory });

    let app = ticketserver::build_router(state);
    let addr = config.server.bind_addr();
    info!("Starting HTTP server on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "postgres")]
fn build_store() -> anyhow::Result<Arc<dyn TicketStore>> {
    use ticketserver::tickets::pg::PgTicketStore;
    let database_url = std::env::var("DATABASE_URL")?;
    Ok(Arc::new(PgTicketStore::connect(&database_url)?))
}

#[cfg(not(feature = "postgres"))]
fn build_store() -> anyhow::Result<Arc<dyn TicketStore>> {
    use ticketserver::tickets::store::MemoryTicketStore;
    Ok(Arc::new(MemoryTicketStore::new()))
}
