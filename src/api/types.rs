use serde::{Deserialize, Serialize};

use crate::search::EngineState;

/// Query string for `GET /api/search`.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Optional so a missing query gets the JSON error body.
    pub q: Option<String>,
    pub limit: Option<usize>,
    pub category: Option<String>,
}

/// Body returned by `POST /api/upload-image`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageUploadResponse {
    pub success: bool,
    #[serde(rename = "imageId")]
    pub image_id: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    pub filename: String,
}

/// Body returned by `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub engine: Option<&'static str>,
    pub search: EngineState,
}

/// Error body for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: detail.into(),
        }
    }
}
