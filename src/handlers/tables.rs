//! Model-file table handlers: add, edit, rename, delete, show.

use crate::error::AppError;
use crate::extractors::JsonBody;
use crate::model::TableInfo;
use crate::response::TablesResponse;
use crate::service::{
    CreateTableRequest, DeleteTableRequest, EditTableRequest, RenameTableRequest, SchemaService,
};
use crate::state::AppState;
use axum::{extract::State, Json};

pub async fn add_table(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateTableRequest>,
) -> Result<Json<TablesResponse>, AppError> {
    Ok(Json(SchemaService::add_table(&state, &body).await?))
}

pub async fn edit_table(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<EditTableRequest>,
) -> Result<Json<TablesResponse>, AppError> {
    Ok(Json(SchemaService::edit_table(&state, &body).await?))
}

pub async fn rename_table(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RenameTableRequest>,
) -> Result<Json<TablesResponse>, AppError> {
    Ok(Json(SchemaService::rename_table(&state, &body).await?))
}

pub async fn delete_table(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<DeleteTableRequest>,
) -> Result<Json<TablesResponse>, AppError> {
    Ok(Json(SchemaService::delete_table(&state, &body).await?))
}

pub async fn show_tables(State(state): State<AppState>) -> Result<Json<Vec<TableInfo>>, AppError> {
    Ok(Json(SchemaService::show_tables(&state).await?))
}
