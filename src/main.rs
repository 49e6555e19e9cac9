use std::sync::Arc;

use marknote::{
    config::{self, StorageConfig},
    handlers::rest,
    models::NewUser,
    repository::{MemoryRepository, PostgresRepository, Repository},
    service::NotebookService,
};

#[tokio::main]
async fn main() {
    // Log setup
    tracing_subscriber::fmt::init();

    // Load config
    let cfg = config::load_config().unwrap_or_else(|e| {
        tracing::error!("Failed to load config: {e}");
        panic!("failed to locate or load config: {e}");
    });
    tracing::info!("Successfully loaded marknote config");

    // Repository creation and migration
    let repo: Arc<dyn Repository> = match &cfg.storage {
        StorageConfig::Postgres { dsn } => {
            let repo = PostgresRepository::new(dsn).await.unwrap_or_else(|e| {
                tracing::error!("Failed to establish database connection: {e}");
                panic!("failed to establish database connection: {e}");
            });
            Arc::new(repo)
        }
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory storage, data is lost on shutdown");
            Arc::new(MemoryRepository::new())
        }
    };

    repo.migrate().await.unwrap_or_else(|e| {
        tracing::error!("Failed to migrate database: {e}");
        panic!("failed to migrate database: {e}");
    });

    // Service creation
    let service = Arc::new(NotebookService::new(repo));

    let users: Vec<NewUser> = cfg.users.into_iter().map(NewUser::from).collect();
    service.bootstrap_users(users).await.unwrap_or_else(|e| {
        tracing::error!("Failed to register configured users: {e}");
        panic!("failed to register configured users: {e}");
    });

    // Router config
    let router = rest::router(service);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.port))
        .await
        .expect("Failed to bind to address");
    let addr = listener.local_addr().expect("listener has no local address");

    tracing::info!("REST server starting, listening on {}", addr);

    axum::serve(listener, router)
        .await
        .expect("Failed to start server");
}
