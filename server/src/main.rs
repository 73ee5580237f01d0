//! schema-forge server: reads settings from the environment (and `.env`), prepares the
//! database, and serves the model and migration API.
//!
//! Run from repo root: `cargo run -p schema-forge-server`

use schema_forge::{
    build_app, ensure_database_exists, AppState, Migrator, ModelStore, PgBackend, SchemaService,
    Settings, DEFAULT_BODY_LIMIT,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("schema_forge=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    ensure_database_exists(&settings.database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;

    let backend = PgBackend::new(pool, settings.db_schema.clone(), settings.version_table.clone());
    backend.ensure_version_table().await?;
    let state = AppState::new(
        ModelStore::new(&settings.models_path, settings.lock_timeout),
        Migrator::new(&settings.versions_dir, Arc::new(backend)),
    );
    SchemaService::refresh_cache(&state).await;

    let app = build_app(state, DEFAULT_BODY_LIMIT);
    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        models = %settings.models_path.display(),
        versions = %settings.versions_dir.display(),
        "schema-forge listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
