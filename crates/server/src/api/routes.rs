use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use super::{auth, download, files, handlers, middleware as mw};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Web page static files path (configured in [server])
    let web_dir = state.config().server.web_dir.clone();

    // API routes
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics));

    // Download routes
    let app_routes = Router::new()
        .route("/download", get(download::start_download))
        .route("/downloads/{session_id}/{*path}", get(files::serve_download))
        // Login
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/check-login", get(auth::check_login));

    // Serve the web page with index fallback
    let index_path = web_dir.join("index.html");
    let serve_dir = ServeDir::new(&web_dir).fallback(ServeFile::new(&index_path));

    Router::new()
        .nest("/api", api_routes)
        .merge(app_routes)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            mw::privilege_middleware,
        ))
        .layer(middleware::from_fn(mw::metrics_middleware))
        .with_state(state)
        .fallback_service(serve_dir)
        .layer(TraceLayer::new_for_http())
}
