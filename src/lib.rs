//! schema-forge: HTTP service that edits a declarative model file and keeps a Postgres
//! schema in step through generated revision scripts.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod model;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod state;
pub mod store;

pub use error::{AppError, ConfigError};
pub use migration::{MigrationBackend, Migrator, PgBackend};
pub use model::{ModelFile, ModelStore};
pub use routes::{app_routes, build_app, common_routes, migrate_routes, table_routes, DEFAULT_BODY_LIMIT};
pub use service::SchemaService;
pub use settings::Settings;
pub use state::AppState;
pub use store::ensure_database_exists;
