//! Post, attachment and image records.
//!
//! Field names follow the JSON layout the records are persisted with, so a
//! post file on disk and an HTTP response body are the same document.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length for short user-provided strings (title, author, etc.).
pub const MAX_FIELD_LENGTH: usize = 200;

/// Maximum length of a cleaned filename stem.
const MAX_STEM_LENGTH: usize = 50;

/// Date format used for `postDate` and `endDate`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9._-]").expect("static regex"));

/// A content record with metadata, HTML body, attachments, and inline images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub department: String,
    pub author: String,
    /// Read counter. Only ever incremented.
    pub views: u64,
    #[serde(rename = "postDate")]
    pub post_date: String,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub category: String,
    #[serde(default)]
    pub badges: Vec<String>,
    /// HTML body. May embed `/static/images/...` URLs by convention.
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub uploaded_images: Vec<UploadedImage>,
}

/// A downloadable file owned by exactly one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    /// Cleaned filename shown to readers.
    pub name: String,
    /// Display-formatted size, e.g. `"12KB"`.
    pub size: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
}

/// An image stored independently of any post and referenced by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub id: String,
    pub filename: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
}

/// Validated-by-the-service input for creating a post.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub department: String,
    pub author: String,
    pub category: String,
    pub content: String,
    /// Raw `endDate` value as submitted (`YYYY-MM-DD`, or empty).
    pub end_date: Option<String>,
    /// Raw `badges` value as submitted (a JSON-encoded array of strings).
    pub badges: Option<String>,
}

/// An uploaded binary as received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    #[must_use]
    pub fn new(filename: impl Into<String>, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.map(str::to_string),
            bytes,
        }
    }

    /// Browsers submit an empty part when a file input is left blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.filename.trim().is_empty()
    }
}

/// Generate a random 128-bit identifier as 32 lowercase hex characters.
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Format a byte count the way attachments display it.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    if bytes < KB {
        format!("{bytes}B")
    } else if bytes < MB {
        format!("{}KB", bytes / KB)
    } else {
        format!("{}MB", bytes / MB)
    }
}

/// Split a filename into stem and extension (extension includes the dot).
///
/// A leading dot does not start an extension, matching how `.bashrc` has no
/// extension.
#[must_use]
pub fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => filename.split_at(idx),
        _ => (filename, ""),
    }
}

/// Reduce a client-supplied filename to ASCII-safe characters.
///
/// Non-ASCII and special characters are dropped from the stem; an empty
/// stem becomes `image`. The stem is capped at 50 characters.
#[must_use]
pub fn clean_filename(filename: &str) -> String {
    if filename.is_empty() {
        return "image".to_string();
    }

    let (stem, ext) = split_extension(filename);
    let mut clean_stem = UNSAFE_FILENAME_CHARS.replace_all(stem, "").into_owned();
    if clean_stem.is_empty() {
        clean_stem = "image".to_string();
    }
    clean_stem.truncate(MAX_STEM_LENGTH);

    let clean_ext = UNSAFE_FILENAME_CHARS.replace_all(ext, "");
    format!("{clean_stem}{clean_ext}")
}

/// Content type for an image filename, by extension.
#[must_use]
pub fn guess_image_type(filename: &str) -> Option<&'static str> {
    let ext = split_extension(filename).1.to_ascii_lowercase();
    match ext.as_str() {
        ".jpg" | ".jpeg" => Some("image/jpeg"),
        ".png" => Some("image/png"),
        ".gif" => Some("image/gif"),
        ".webp" => Some("image/webp"),
        ".bmp" => Some("image/bmp"),
        ".svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Parse the JSON-encoded badge list submitted with a post.
///
/// # Errors
///
/// Returns the parser message if the value is not a JSON array of strings.
pub fn parse_badges(raw: Option<&str>) -> Result<Vec<String>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(vec![]),
        Some(value) => serde_json::from_str(value).map_err(|e| e.to_string()),
    }
}

/// Normalise an optional `YYYY-MM-DD` date; empty means absent.
///
/// # Errors
///
/// Returns a message if the value is present but not a valid date.
pub fn parse_end_date(raw: Option<&str>) -> Result<Option<String>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map(|date| Some(date.format(DATE_FORMAT).to_string()))
            .map_err(|e| format!("invalid endDate '{value}': {e}")),
    }
}
