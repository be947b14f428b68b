//! API surface for Strata
//!
//! The MCP tools are reachable over stdio or over HTTP; the HTTP router also
//! carries the health endpoints.

pub mod mcp;
pub mod status;
pub mod stdio;

use axum::routing::post;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build the API routes.
///
/// Route structure:
/// - /mcp - MCP JSON-RPC endpoint
/// - /health, /status - Health checks
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(status::routes())
        .route("/mcp", post(mcp::handle_mcp_post))
}

/// The complete HTTP application, with tracing and CORS layers.
pub fn router(state: AppState) -> Router {
    routes()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
