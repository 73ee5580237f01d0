//! Migration command routes.

use crate::handlers::migrate::{
    current, downgrade, generate_migration, head, revisions, upgrade, upgrade_head,
};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

pub fn migrate_routes(state: AppState) -> Router {
    Router::new()
        .route("/migrate/generate_migration", post(generate_migration))
        .route("/migrate/upgrade", post(upgrade_head))
        .route("/migrate/upgrade/:revision", post(upgrade))
        .route("/migrate/downgrade", post(downgrade))
        .route("/migrate/head", get(head))
        .route("/migrate/current", get(current))
        .route("/migrate/revisions", get(revisions))
        .with_state(state)
}
