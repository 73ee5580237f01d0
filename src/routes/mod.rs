//! Routers per concern; `app_routes` merges them.

mod common;
mod migrate;
mod tables;

pub use common::common_routes;
pub use migrate::migrate_routes;
pub use tables::table_routes;

use crate::state::AppState;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, map_response_body::MapResponseBodyLayer,
    trace::TraceLayer,
};

/// Request bodies above this size are rejected with 413.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(table_routes(state.clone()))
        .merge(migrate_routes(state))
}

/// All routes with request tracing, permissive CORS and a body size limit.
pub fn build_app(state: AppState, body_limit: usize) -> Router {
    app_routes(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(MapResponseBodyLayer::new(axum::body::Body::new))
            .layer(RequestBodyLimitLayer::new(body_limit)),
    )
}
