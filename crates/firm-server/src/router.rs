use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all firmnode endpoints.
pub fn build_router(state: AppState, max_body: usize) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route("/v1/entries/:address", get(handler::entry_stat_handler))
        .route("/v1/entries/:address/cid", get(handler::entry_cid_handler))
        .route("/v1/entries/:address/paths/*sub", get(handler::sub_path_cid_handler))
        .route("/v1/entries/:address/read", get(handler::read_root_handler))
        .route("/v1/entries/:address/read/*sub", get(handler::read_handler))
        .route("/v1/entries/:address/import", post(handler::import_handler))
        .route("/v1/messages", post(handler::send_handler))
        .route("/v1/blocks/:cid", get(handler::block_handler))
        .route("/v1/blocks/:cid/stat", get(handler::block_stat_handler))
        .fallback(handler::not_found_handler)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
