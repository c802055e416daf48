pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

pub use api::routes::create_router;
pub use error::{AggregateError, AggregateResult, ErrorKind};
pub use logic::Inventory;
pub use model::*;
pub use store::{AggregateStore, MemoryStore, PostgresStore};

use std::sync::Arc;

use config::{AppConfig, StorageBackend};

/// Build the HTTP application over `store`
pub fn build_app<S: AggregateStore + 'static>(
    store: S,
    schema: Arc<InventorySchema>,
) -> axum::Router {
    let inventory = Inventory::new(Arc::new(store), schema);
    create_router().with_state(Arc::new(inventory))
}

/// Open the configured storage backend and build the application on it
pub async fn app_from_config(config: &AppConfig) -> anyhow::Result<axum::Router> {
    let schema = Arc::new(InventorySchema::assemble()?);

    match config.database.backend {
        StorageBackend::Postgres => {
            let database_url = config.database_url()?;
            let store = PostgresStore::new(&database_url, config.max_connections()).await?;
            if config.database.run_migrations {
                log::info!("Running database migrations...");
                store.migrate().await?;
            }
            Ok(build_app(store, schema))
        }
        StorageBackend::Memory => {
            log::warn!("Using in-memory storage; records are lost on exit");
            Ok(build_app(MemoryStore::new(&schema), schema))
        }
    }
}

// Function for integration testing
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let config = AppConfig::load()?;
    let app = app_from_config(&config).await?;

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Asset inventory listening on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
