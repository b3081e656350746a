use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swarnabindu::api::router;
use swarnabindu::config::AppConfig;
use swarnabindu::connectivity::Connectivity;
use swarnabindu::mapping::FieldMapping;
use swarnabindu::queue::OfflineQueue;
use swarnabindu::remote::{HttpRemoteStore, RemoteStore};
use swarnabindu::services::{ConnectivityProbe, SyncScheduler, SyncService};
use swarnabindu::state::AppState;
use swarnabindu::storage::SqliteKvStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "swarnabindu=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let registrations = FieldMapping::registrations();
    let screenings = FieldMapping::screenings();
    registrations.validate(None)?;
    screenings.validate(None)?;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let queue = Arc::new(OfflineQueue::new(Arc::new(SqliteKvStore::new(pool.clone()))));
    let remote: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::new(config.remote.clone())?);
    let connectivity = Connectivity::new(false);

    let sync = Arc::new(
        SyncService::new(queue.clone(), remote.clone(), connectivity.clone(), config.remote.timeout)
            .with_mappings(registrations, screenings),
    );

    info!("{} records waiting to sync", queue.pending_count().await?);

    tokio::spawn(SyncScheduler::new(sync.clone(), connectivity.clone()).start());
    tokio::spawn(
        ConnectivityProbe::new(remote, connectivity.clone(), config.probe_interval_secs).start(),
    );

    let state = AppState {
        db: pool,
        queue,
        sync,
        connectivity,
    };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
