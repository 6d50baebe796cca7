//! Post operations shared by the HTTP API, the CLI, and the MCP server.

use std::fmt::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;

use crate::config::{Config, Engine, SearchConfig};
use crate::post::{
    self, Attachment, DATE_FORMAT, MAX_FIELD_LENGTH, NewPost, Post, Upload, UploadedImage,
    clean_filename,
};
use crate::search::elastic::ElasticBackend;
use crate::search::{EngineState, SearchBackend, SearchIndex, SearchOptions};
use crate::storage::local::LocalStorageBackend;
use crate::storage::{BinaryKind, StorageBackend, StorageError, StorageLayout, StoredFile};

/// Maximum length for a search query.
pub const MAX_QUERY_LENGTH: usize = 1000;

/// Image types accepted inline with a new post.
const POST_IMAGE_TYPES: [&str; 6] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
];

/// Image types accepted by the standalone upload.
const UPLOAD_IMAGE_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

/// Extension used when an uploaded image has none.
const DEFAULT_IMAGE_EXTENSION: &str = ".jpg";

/// Errors surfaced by post operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Storage(StorageError),

    #[error("Search unavailable: {0}")]
    SearchUnavailable(String),
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => Self::NotFound(what),
            other => Self::Storage(other),
        }
    }
}

/// A standalone image upload, not yet referenced by any post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub id: String,
    pub url: String,
    pub filename: String,
}

/// Orchestrates storage and the search index.
pub struct PostService {
    store: Arc<dyn StorageBackend>,
    search: SearchIndex,
    /// Serialises the load/increment/save of view counters.
    views: Mutex<()>,
}

impl PostService {
    #[must_use]
    pub fn new(store: Arc<dyn StorageBackend>, search: SearchIndex) -> Self {
        Self {
            store,
            search,
            views: Mutex::new(()),
        }
    }

    /// Build the service a config describes: a filesystem store under
    /// `storage.data_dir` plus the configured search engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directories cannot be created or the
    /// engine cannot be set up.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let data_dir = config.storage.data_dir();
        let store: Arc<dyn StorageBackend> =
            Arc::new(LocalStorageBackend::open(StorageLayout::under(&data_dir))?);
        let engine = open_engine(&config.search, &data_dir)?;
        let search = SearchIndex::new(
            engine,
            Arc::clone(&store),
            config.search.health_check_interval(),
        );

        Ok(Self::new(store, search))
    }

    /// A service with no search engine; queries scan storage.
    #[must_use]
    pub fn scan_only(store: Arc<dyn StorageBackend>) -> Self {
        let search = SearchIndex::scan_only(Arc::clone(&store));
        Self::new(store, search)
    }

    /// Current search engine state.
    pub fn search_state(&self) -> EngineState {
        self.search.state()
    }

    #[must_use]
    pub fn search_engine(&self) -> Option<&'static str> {
        self.search.engine_name()
    }

    /// Create a post, storing its attachments and inline images.
    ///
    /// Blank attachment parts are ignored. Inline images with a missing or
    /// unsupported content type are skipped; stored ones are appended to the
    /// content as `<img>` tags.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for missing or malformed fields and
    /// `ServiceError::Storage` if a binary or the record cannot be written.
    /// Files written before a failure are left in place.
    pub fn create_post(
        &self,
        fields: NewPost,
        files: Vec<Upload>,
        images: Vec<Upload>,
    ) -> Result<Post, ServiceError> {
        let NewPost {
            title,
            department,
            author,
            category,
            mut content,
            end_date,
            badges,
        } = fields;

        validate_field(&title, "title")?;
        validate_field(&department, "department")?;
        validate_field(&author, "author")?;
        validate_field(&category, "category")?;
        if content.trim().is_empty() {
            return Err(ServiceError::Validation("content is required".to_string()));
        }

        let badges = post::parse_badges(badges.as_deref())
            .map_err(|e| ServiceError::Validation(format!("badges must be a JSON array of strings: {e}")))?;
        let end_date = post::parse_end_date(end_date.as_deref()).map_err(ServiceError::Validation)?;

        let attachments = self.store_attachments(files)?;
        let uploaded_images = self.store_inline_images(images)?;

        if !uploaded_images.is_empty() {
            content.push_str(&image_tags(&uploaded_images));
        }

        let post = Post {
            id: post::generate_id(),
            title,
            department,
            author,
            views: 0,
            post_date: Local::now().format(DATE_FORMAT).to_string(),
            end_date,
            category,
            badges,
            content,
            attachments,
            uploaded_images,
        };

        self.store.save_post(&post)?;
        self.search.index_post(&post);

        tracing::info!(
            post_id = %post.id,
            attachments = post.attachments.len(),
            images = post.uploaded_images.len(),
            "post created"
        );

        Ok(post)
    }

    fn store_attachments(&self, files: Vec<Upload>) -> Result<Vec<Attachment>, ServiceError> {
        let mut attachments = Vec::new();

        for file in files {
            if file.is_blank() {
                continue;
            }

            let name = clean_filename(&file.filename);
            let stored = self
                .store
                .save_binary(BinaryKind::Attachment, &file.bytes, &name)?;

            attachments.push(Attachment {
                id: stored.id,
                name,
                size: post::format_size(stored.size),
                download_url: stored.url,
                original_filename: Some(file.filename),
            });
        }

        Ok(attachments)
    }

    fn store_inline_images(&self, images: Vec<Upload>) -> Result<Vec<UploadedImage>, ServiceError> {
        let mut stored_images = Vec::new();

        for image in images {
            if image.is_blank() {
                continue;
            }

            let content_type = image.content_type.as_deref().unwrap_or_default();
            if !POST_IMAGE_TYPES.contains(&content_type) {
                tracing::warn!(
                    filename = %image.filename,
                    content_type,
                    "skipping unsupported inline image"
                );
                continue;
            }

            let name = clean_filename(&image.filename);
            let stored = self
                .store
                .save_binary(BinaryKind::Image, &image.bytes, &with_image_extension(&name))?;

            stored_images.push(UploadedImage {
                id: stored.id,
                filename: name,
                url: stored.url,
                original_filename: Some(image.filename),
            });
        }

        Ok(stored_images)
    }

    /// Fetch a post and count the read.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for unknown ids and
    /// `ServiceError::Storage` if the updated counter cannot be saved.
    pub fn get_post(&self, id: &str) -> Result<Post, ServiceError> {
        let _guard = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        let mut post = self.store.get_post(id)?;
        post.views += 1;
        self.store.save_post(&post)?;
        Ok(post)
    }

    /// All posts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Storage` if posts cannot be listed.
    pub fn list_posts(&self) -> Result<Vec<Post>, ServiceError> {
        let mut posts = self.store.list_posts()?;
        crate::search::scan::sort_newest_first(&mut posts);
        Ok(posts)
    }

    /// Search posts via the engine, or a storage scan when it is unavailable.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for over-long queries and
    /// `ServiceError::Storage` if storage fails.
    pub fn search_posts(&self, query: &str, options: &SearchOptions) -> Result<Vec<Post>, ServiceError> {
        let len = query.chars().count();
        if len > MAX_QUERY_LENGTH {
            return Err(ServiceError::Validation(format!(
                "query too long: {len} chars (max {MAX_QUERY_LENGTH})"
            )));
        }

        Ok(self.search.search(query, options)?)
    }

    /// Store an image independently of any post.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for non-image or unsupported types
    /// and `ServiceError::Storage` if the image cannot be written.
    pub fn upload_image(&self, upload: Upload) -> Result<ImageUpload, ServiceError> {
        let content_type = upload.content_type.as_deref().unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Err(ServiceError::Validation(
                "Only image files are allowed".to_string(),
            ));
        }
        if !UPLOAD_IMAGE_TYPES.contains(&content_type) {
            return Err(ServiceError::Validation(
                "Unsupported image format".to_string(),
            ));
        }

        let stored = self.store.save_binary(
            BinaryKind::Image,
            &upload.bytes,
            &with_image_extension(&clean_filename(&upload.filename)),
        )?;

        let filename = if upload.is_blank() {
            stored.stored_name
        } else {
            upload.filename
        };

        tracing::info!(image_id = %stored.id, "image uploaded");

        Ok(ImageUpload {
            id: stored.id,
            url: stored.url,
            filename,
        })
    }

    /// Read an attachment for download.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if no attachment has that id.
    pub fn attachment(&self, file_id: &str) -> Result<StoredFile, ServiceError> {
        Ok(self.store.read_attachment(file_id)?)
    }

    /// Read a stored image by filename.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if no image has that name.
    pub fn image(&self, filename: &str) -> Result<StoredFile, ServiceError> {
        Ok(self.store.read_image(filename)?)
    }

    /// Push every stored post into the search engine.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::SearchUnavailable` if there is no usable engine.
    pub fn reindex(&self) -> Result<usize, ServiceError> {
        self.search
            .reindex()
            .map_err(|e| ServiceError::SearchUnavailable(format!("{e:#}")))
    }
}

fn open_engine(
    config: &SearchConfig,
    data_dir: &Path,
) -> anyhow::Result<Option<Box<dyn SearchBackend>>> {
    match config.engine {
        Engine::Disabled => Ok(None),
        Engine::Elasticsearch => Ok(Some(Box::new(ElasticBackend::new(
            &config.url,
            &config.index,
            config.timeout(),
        )?))),
        #[cfg(feature = "ranked")]
        Engine::Tantivy => Ok(Some(Box::new(
            crate::search::tantivy::TantivyBackend::open_in(data_dir)?,
        ))),
        #[cfg(not(feature = "ranked"))]
        Engine::Tantivy => {
            let _ = data_dir;
            anyhow::bail!("The tantivy engine requires the `ranked` feature")
        }
    }
}

fn validate_field(value: &str, field_name: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{field_name} is required")));
    }

    let len = value.chars().count();
    if len > MAX_FIELD_LENGTH {
        return Err(ServiceError::Validation(format!(
            "{field_name} too long: {len} chars (max {MAX_FIELD_LENGTH})"
        )));
    }

    Ok(())
}

/// Keep the cleaned name's extension, or fall back to `.jpg`.
fn with_image_extension(name: &str) -> String {
    if post::split_extension(name).1.is_empty() {
        format!("{name}{DEFAULT_IMAGE_EXTENSION}")
    } else {
        name.to_string()
    }
}

/// `<img>` tags for inline images, wrapped in a single `<div>`.
fn image_tags(images: &[UploadedImage]) -> String {
    let mut html = String::from("<div>");
    for image in images {
        let _ = write!(
            html,
            r#"<img src="{}" alt="{}" style="max-width: 100%; height: auto;">"#,
            image.url, image.filename
        );
    }
    html.push_str("</div>");
    html
}
