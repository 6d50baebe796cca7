use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::service::PostService;

use super::handlers::{
    create_post, download_attachment, get_post, health_check, list_posts, search_posts,
    serve_image, upload_image,
};

/// Application state shared across all handlers
pub struct AppState {
    pub service: Arc<PostService>,
}

/// Create the HTTP router with all endpoints
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Posts
        .route("/api/posts", post(create_post).get(list_posts))
        .route("/api/posts/:id", get(get_post))
        .route("/api/search", get(search_posts))
        // Binaries
        .route("/api/upload-image", post(upload_image))
        .route("/api/attachments/:file_id/download", get(download_attachment))
        .route("/static/images/:filename", get(serve_image))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
