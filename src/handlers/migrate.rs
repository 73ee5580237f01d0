//! Migration command handlers.

use crate::error::AppError;
use crate::migration::RevisionRecord;
use crate::response::{CurrentResponse, Detail, HeadsResponse};
use crate::service::SchemaService;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DowngradeParams {
    pub revision: Option<String>,
}

pub async fn generate_migration(
    State(state): State<AppState>,
    Query(params): Query<GenerateParams>,
) -> Result<Json<Detail>, AppError> {
    Ok(Json(
        SchemaService::generate_migration(&state, params.message.as_deref()).await?,
    ))
}

pub async fn upgrade(
    State(state): State<AppState>,
    Path(revision): Path<String>,
) -> Result<Json<Detail>, AppError> {
    Ok(Json(SchemaService::upgrade(&state, &revision).await?))
}

pub async fn upgrade_head(State(state): State<AppState>) -> Result<Json<Detail>, AppError> {
    Ok(Json(SchemaService::upgrade(&state, "head").await?))
}

pub async fn downgrade(
    State(state): State<AppState>,
    Query(params): Query<DowngradeParams>,
) -> Result<Json<Detail>, AppError> {
    let revision = params.revision.unwrap_or_else(|| "-1".into());
    Ok(Json(SchemaService::downgrade(&state, &revision).await?))
}

pub async fn head(State(state): State<AppState>) -> Result<Json<HeadsResponse>, AppError> {
    Ok(Json(HeadsResponse {
        heads: SchemaService::heads(&state).await?,
    }))
}

pub async fn current(State(state): State<AppState>) -> Result<Json<CurrentResponse>, AppError> {
    Ok(Json(CurrentResponse {
        current: SchemaService::current(&state).await?,
    }))
}

pub async fn revisions(State(state): State<AppState>) -> Result<Json<Vec<RevisionRecord>>, AppError> {
    Ok(Json(SchemaService::revisions(&state).await?))
}
