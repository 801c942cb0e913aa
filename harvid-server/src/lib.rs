//! HTTP layer wrapping `harvid-core` (§6.1): a thin `axum` router, CLI/
//! config, path sanitation, image encoding, directory-index rendering, and
//! embedded static assets. None of this contains the hard algorithmic
//! problems the core does; it exists so the server is runnable end to end.

pub mod assets;
pub mod config;
pub mod dirindex;
pub mod encode;
pub mod error;
pub mod path_guard;
pub mod routes;
pub mod state;

use axum::{routing::get, routing::post, Router};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::AppState;

/// Builds the full `axum` router for a given `AppState`, independent of
/// whether it's ultimately served over a real socket or driven in-process
/// via `tower::ServiceExt::oneshot` in tests.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/info", get(routes::file_info))
        .route("/pool", get(routes::pool_info))
        .route("/purge", post(routes::purge))
        .route("/favicon.ico", get(assets::favicon))
        .route("/harvid.png", get(assets::logo))
        .route("/*path", get(routes::serve_path))
        .route("/", get(routes::serve_root))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
