//! SchemaService: structural edits of the model file, each followed by a generated and
//! applied migration, plus the plain migration commands.

use crate::error::AppError;
use crate::migration::{sanitize_message, RevisionRecord};
use crate::model::{editor, ModelFile, TableInfo};
use crate::response::{Detail, TablesResponse};
use crate::service::validation::{
    CreateTableRequest, DeleteTableRequest, EditTableRequest, RenameTableRequest,
};
use crate::state::AppState;

pub const DEFAULT_MIGRATION_MESSAGE: &str = "autogenerated migration";

pub struct SchemaService;

impl SchemaService {
    fn model_file_name(state: &AppState) -> String {
        state
            .models
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| state.models.path().display().to_string())
    }

    /// Settle pending revisions, apply `edit` to the model file, then generate and apply a
    /// revision named `message`. Holds the writer lock throughout.
    async fn structural_change<F>(state: &AppState, message: String, edit: F) -> Result<Vec<TableInfo>, AppError>
    where
        F: FnOnce(&mut ModelFile) -> Result<(), AppError>,
    {
        let _writer = state.writer.lock().await;
        state.migrator.upgrade("head").await?;
        let model = state.models.mutate(edit).await?;
        state.install_model(model.clone());
        if let Err(e) = Self::migrate(state, &message, &model).await {
            tracing::error!(error = %e, message = %message, "model file changed but migration failed");
            return Err(e);
        }
        Ok(model.inventory())
    }

    async fn migrate(state: &AppState, message: &str, model: &ModelFile) -> Result<(), AppError> {
        state
            .migrator
            .autogenerate(&sanitize_message(message), model)
            .await?;
        state.migrator.upgrade("head").await?;
        Ok(())
    }

    pub async fn add_table(state: &AppState, req: &CreateTableRequest) -> Result<TablesResponse, AppError> {
        let spec = req.validate()?;
        let name = spec.name.clone();
        let tables = Self::structural_change(state, format!("Add table {}", name), move |model| {
            editor::add_table(model, &spec)
        })
        .await?;
        tracing::info!(table = %name, "table added");
        Ok(TablesResponse {
            detail: format!("Table '{}' added to {}.", name, Self::model_file_name(state)),
            tables,
        })
    }

    pub async fn edit_table(state: &AppState, req: &EditTableRequest) -> Result<TablesResponse, AppError> {
        let spec = req.validate()?;
        let name = spec.table_name.clone();
        let tables = Self::structural_change(state, format!("Edited table {}", name), move |model| {
            editor::edit_table(model, &spec)
        })
        .await?;
        tracing::info!(table = %name, "table edited");
        Ok(TablesResponse {
            detail: format!(
                "Table '{}' edited successfully in {}.",
                name,
                Self::model_file_name(state)
            ),
            tables,
        })
    }

    pub async fn rename_table(state: &AppState, req: &RenameTableRequest) -> Result<TablesResponse, AppError> {
        let (old, new) = req.validate()?;
        let message = format!("renamed table {} to {}", old, new);
        let tables = {
            let (old, new) = (old.clone(), new.clone());
            Self::structural_change(state, message, move |model| {
                editor::rename_table(model, &old, &new)
            })
            .await?
        };
        tracing::info!(from = %old, to = %new, "table renamed");
        Ok(TablesResponse {
            detail: format!(
                "Table '{}' renamed to '{}' in {}.",
                old,
                new,
                Self::model_file_name(state)
            ),
            tables,
        })
    }

    pub async fn delete_table(state: &AppState, req: &DeleteTableRequest) -> Result<TablesResponse, AppError> {
        let name = req.validate();
        let tables = {
            let name = name.clone();
            Self::structural_change(state, format!("Deleted table {}", name), move |model| {
                editor::delete_table(model, &name)
            })
            .await?
        };
        tracing::info!(table = %name, "table deleted");
        Ok(TablesResponse {
            detail: format!(
                "Table '{}' deleted successfully from {}.",
                name,
                Self::model_file_name(state)
            ),
            tables,
        })
    }

    /// Re-read the model file into the cache and return its inventory.
    pub async fn show_tables(state: &AppState) -> Result<Vec<TableInfo>, AppError> {
        if !state.models.exists().await {
            return Err(AppError::NotFound(format!(
                "{} file not found",
                Self::model_file_name(state)
            )));
        }
        let model = state.models.load().await?;
        let tables = model.inventory();
        state.install_model(model);
        Ok(tables)
    }

    /// Reload the cache from disk; on failure the previous cache stays in place.
    pub async fn refresh_cache(state: &AppState) {
        match state.models.load().await {
            Ok(model) => {
                tracing::debug!(tables = model.tables().count(), "model cache refreshed");
                state.install_model(model);
            }
            Err(e) => tracing::warn!(error = %e, "model cache refresh failed; keeping previous model"),
        }
    }

    pub async fn generate_migration(state: &AppState, message: Option<&str>) -> Result<Detail, AppError> {
        let message = sanitize_message(message.unwrap_or(DEFAULT_MIGRATION_MESSAGE));
        let _writer = state.writer.lock().await;
        let model = state.models.load().await?;
        state.migrator.autogenerate(&message, &model).await?;
        Ok(Detail::new("Migration script generated successfully"))
    }

    pub async fn upgrade(state: &AppState, revision: &str) -> Result<Detail, AppError> {
        let _writer = state.writer.lock().await;
        state.migrator.upgrade(revision).await?;
        Ok(Detail::new(format!("Upgraded to revision {} successfully", revision)))
    }

    pub async fn downgrade(state: &AppState, revision: &str) -> Result<Detail, AppError> {
        let _writer = state.writer.lock().await;
        state.migrator.downgrade(revision).await?;
        Ok(Detail::new(format!("Downgraded to revision {} successfully", revision)))
    }

    pub async fn heads(state: &AppState) -> Result<Vec<String>, AppError> {
        state.migrator.heads().await
    }

    pub async fn current(state: &AppState) -> Result<Vec<String>, AppError> {
        state.migrator.current().await
    }

    pub async fn revisions(state: &AppState) -> Result<Vec<RevisionRecord>, AppError> {
        state.migrator.revisions().await
    }
}
