//! Service probes: liveness, readiness (database and model file), build version.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize)]
struct Readiness {
    status: &'static str,
    database: &'static str,
    models: &'static str,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// 503 while the database is unreachable. A missing model file is reported but does not
/// fail readiness, since show_tables answers it with 404.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let database = match state.migrator.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "database ping failed");
            "unavailable"
        }
    };
    let models = if state.models.exists().await { "ok" } else { "missing" };
    let (code, status) = if database == "ok" {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        code,
        Json(Readiness {
            status,
            database,
            models,
        }),
    )
}

async fn version() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health, GET /ready, GET /version.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}
