use anyhow::Context;
use axum::Router;
use diesel_migrations::MigrationHarness;
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crmserver::api_router::configure_api_routes;
use crmserver::shared::config::AppConfig;
use crmserver::shared::state::AppState;
use crmserver::shared::utils::create_conn;
use crmserver::MIGRATIONS;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let pool = create_conn(&config.database.url, config.database.max_connections)?;

    {
        let mut conn = pool.get().context("failed to acquire migration connection")?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("failed to run migrations: {}", e))?;
    }

    let bind = config.server.bind.clone();
    let state = Arc::new(AppState::new(pool, config)?);

    let app = Router::new()
        .nest("/api", configure_api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!("listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
