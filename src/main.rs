use std::sync::Arc;

use anyhow::Context;
use crm_api::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{InMemoryRepository, PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, connects the repository and serves
/// the HTTP API until the process is stopped.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration (fail fast on an incomplete production setup)
    dotenv::dotenv().ok();
    let config = AppConfig::load().context("invalid configuration")?;

    // 2. Logging: RUST_LOG wins, otherwise a development default.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "crm_api=debug,audit=info,tower_http=info".into());

    // 3. Human-readable output locally, JSON for log aggregation in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);
    if config.api_keys.is_none() {
        tracing::warn!("No API key configured; company and contact endpoints will return 500");
    }
    if config.session_users.is_none() {
        tracing::warn!("CRM_AUTH_USERS is not set; session endpoints will return 500");
    }

    // 4. Repository: Postgres when a database is configured, in-memory otherwise.
    let repo: RepositoryState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(db_url)
                .await
                .context("failed to connect to Postgres, check DATABASE_URL")?;
            let repo = PostgresRepository::new(pool);
            repo.migrate().await.context("failed to run database migrations")?;
            tracing::info!("Connected to Postgres, migrations applied");
            Arc::new(repo) as RepositoryState
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory repository");
            Arc::new(InMemoryRepository::new()) as RepositoryState
        }
    };

    // 5. State, router, server.
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(repo, config));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("OpenAPI document available at /api/openapi");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
