use axum::{
    Json,
    extract::{
        Path, Query, State,
        multipart::{Field, Multipart, MultipartError},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::api::types::{ErrorResponse, HealthResponse, ImageUploadResponse, SearchParams};
use crate::post::{NewPost, Upload, guess_image_type};
use crate::search::SearchOptions;
use crate::service::ServiceError;

use super::router::AppState;

/// Error wrapper for API handlers
pub enum ApiError {
    Service(ServiceError),
    BadRequest(String),
    /// Malformed or oversized multipart body, with the status axum assigns.
    Payload(StatusCode, String),
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        ApiError::Service(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Payload(e.status(), format!("invalid multipart body: {}", e.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Service(e) => {
                let (status, error_type) = match &e {
                    ServiceError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                    ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                    ServiceError::Storage(_) => {
                        tracing::error!(error = %e, "storage failure");
                        (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
                    }
                    ServiceError::SearchUnavailable(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, "search_unavailable")
                    }
                };
                (status, error_type, e.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Payload(status, msg) => (status, "invalid_payload", msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        (status, Json(ErrorResponse::new(error_type, message))).into_response()
    }
}

/// Run blocking storage/engine work off the async workers.
async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("worker failed: {e}")))?
        .map_err(ApiError::from)
}

async fn read_upload(field: Field<'_>) -> Result<Upload, ApiError> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);
    let bytes = field.bytes().await?;

    Ok(Upload {
        filename,
        content_type,
        bytes: bytes.to_vec(),
    })
}

/// Create a post from a multipart form
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut fields = NewPost::default();
    let mut files = Vec::new();
    let mut images = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => files.push(read_upload(field).await?),
            "images" => images.push(read_upload(field).await?),
            "title" => fields.title = field.text().await?,
            "department" => fields.department = field.text().await?,
            "author" => fields.author = field.text().await?,
            "category" => fields.category = field.text().await?,
            "content" => fields.content = field.text().await?,
            "endDate" => fields.end_date = Some(field.text().await?),
            "badges" => fields.badges = Some(field.text().await?),
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    let service = Arc::clone(&state.service);
    let post = run_blocking(move || service.create_post(fields, files, images)).await?;

    Ok(Json(post))
}

/// List all posts
pub async fn list_posts(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let service = Arc::clone(&state.service);
    let posts = run_blocking(move || service.list_posts()).await?;
    Ok(Json(posts))
}

/// Get a post by ID, counting the view
pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = Arc::clone(&state.service);
    let post = run_blocking(move || service.get_post(&id)).await?;
    Ok(Json(post))
}

/// Search posts
pub async fn search_posts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params
        .q
        .ok_or_else(|| ApiError::BadRequest("q parameter is required".to_string()))?;
    let service = Arc::clone(&state.service);
    let options = SearchOptions {
        limit: params.limit,
        category: params.category,
        fuzzy: None,
    };
    let posts = run_blocking(move || service.search_posts(&query, &options)).await?;
    Ok(Json(posts))
}

/// Upload an image for later embedding in post content
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            image = Some(read_upload(field).await?);
        }
    }
    let image = image.ok_or_else(|| ApiError::BadRequest("image field is required".to_string()))?;

    let service = Arc::clone(&state.service);
    let uploaded = run_blocking(move || service.upload_image(image)).await?;

    Ok(Json(ImageUploadResponse {
        success: true,
        image_id: uploaded.id,
        image_url: uploaded.url,
        filename: uploaded.filename,
    }))
}

/// Download an attachment by ID
pub async fn download_attachment(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = Arc::clone(&state.service);
    let file = run_blocking(move || service.attachment(&file_id)).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.stored_name),
            ),
        ],
        file.bytes,
    ))
}

/// Serve a stored image
pub async fn serve_image(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = Arc::clone(&state.service);
    let file = run_blocking(move || service.image(&filename)).await?;

    Ok((
        [(
            header::CONTENT_TYPE,
            guess_image_type(&file.stored_name).unwrap_or("application/octet-stream"),
        )],
        file.bytes,
    ))
}

/// Health check, including search engine state
pub async fn health_check(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let service = Arc::clone(&state.service);
    let (engine, search) =
        run_blocking(move || Ok((service.search_engine(), service.search_state()))).await?;

    Ok(Json(HealthResponse {
        status: "ok",
        engine,
        search,
    }))
}
