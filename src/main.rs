// src/main.rs

use std::net::SocketAddr;

use anyhow::Context;
use dotenvy::dotenv;
use exam_portal::config::Config;
use exam_portal::handlers::auth::seed_admin_user;
use exam_portal::state::AppState;
use exam_portal::{db, routes, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env()?;

    let _guard = telemetry::init(&config.rust_log, "exam-portal.log");

    let pool = db::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    db::migrate(&pool)
        .await
        .context("failed to run database migrations")?;
    tracing::info!("Migrations applied successfully.");

    if let Err(e) = seed_admin_user(&pool, &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let state = AppState { pool, config };
    let app = routes::create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app).await?;

    Ok(())
}
