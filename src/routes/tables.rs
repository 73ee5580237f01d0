//! Table edit routes over the model file.

use crate::handlers::tables::{add_table, delete_table, edit_table, rename_table, show_tables};
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

pub fn table_routes(state: AppState) -> Router {
    Router::new()
        .route("/add_table", post(add_table))
        .route("/migrate/edit_table", post(edit_table))
        .route("/migrate/rename_table", post(rename_table))
        .route("/migrate/delete_table", post(delete_table))
        .route("/migrate/show_tables", get(show_tables))
        .with_state(state)
}
