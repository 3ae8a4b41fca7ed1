//! Router assembly.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    // Several files may share one request, each up to the per-file cap
    let body_limit = state.max_upload_bytes.saturating_mul(4).saturating_add(1024 * 1024);
    let cors = state.cors;

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/chat", post(handlers::chat))
        .route(
            "/history",
            get(handlers::history).delete(handlers::clear_history),
        )
        .route("/reload", post(handlers::reload))
        .route("/documents", get(handlers::list_documents))
        .route("/upload", post(handlers::upload));

    let mut app = Router::new()
        .route("/", get(handlers::index))
        .nest("/api", api)
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http());

    if cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app
}
