//! Revision-based schema migrations: scripts on disk, a version table in the database and
//! autogeneration from the model file.

pub mod backend;
pub mod ddl;
pub mod diff;
pub mod engine;
pub mod graph;
pub mod revision;
pub mod schema;

pub use backend::{MigrationBackend, PgBackend};
pub use engine::Migrator;
pub use graph::RevisionGraph;
pub use revision::{sanitize_message, RevisionRecord, RevisionScript};
pub use schema::{LiveColumn, LiveSchema, LiveTable};
