//! Request validation and the schema service that drives model edits and migrations.

mod schema;
pub mod validation;
pub use schema::{SchemaService, DEFAULT_MIGRATION_MESSAGE};
pub use validation::{
    CreateTableRequest, DeleteTableRequest, EditTableRequest, RenameTableRequest,
};
