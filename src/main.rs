use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geoguess::cleanup::start_cleanup_task;
use geoguess::game::postgres::PostgresGameStore;
use geoguess::game::repository::{GameStore, InMemoryGameStore};
use geoguess::routes::build_router;
use geoguess::{AppConfig, AppStateBuilder};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geoguess=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting geoguess game server");

    let config = AppConfig::from_env();

    // Postgres when DATABASE_URL is set, otherwise everything stays in memory
    let game_store: Arc<dyn GameStore> = match &config.database_url {
        Some(database_url) => {
            let pool = match sqlx::PgPool::connect(database_url).await {
                Ok(pool) => pool,
                Err(e) => {
                    error!(error = %e, "Failed to connect to database");
                    std::process::exit(1);
                }
            };
            let store = PostgresGameStore::new(pool);
            if let Err(e) = store.migrate().await {
                error!(error = %e, "Failed to apply database schema");
                std::process::exit(1);
            }
            info!("Using PostgreSQL game store");
            Arc::new(store)
        }
        None => {
            info!("DATABASE_URL not set, using in-memory game store");
            Arc::new(InMemoryGameStore::new())
        }
    };

    let bind_addr = config.bind_addr.clone();
    let cleanup_interval = config.cleanup_interval();
    let app_state = AppStateBuilder::new()
        .with_config(config)
        .with_game_store(game_store)
        .build();

    tokio::spawn(start_cleanup_task(
        Arc::clone(&app_state.lobby_service),
        Arc::clone(&app_state.session_service),
        cleanup_interval,
    ));

    let app = build_router(app_state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, bind_addr = %bind_addr, "Failed to bind");
            std::process::exit(1);
        }
    };
    info!("Server running on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Server error");
    }
}
