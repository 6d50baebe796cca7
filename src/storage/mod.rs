//! Storage backend trait and implementations.
//!
//! The storage backend is the source of truth for posts and uploaded
//! binaries. Search engines only ever mirror what is stored here.

pub mod local;

use std::path::{Path, PathBuf};

use crate::post::Post;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to read: {0}")]
    ReadError(String),

    #[error("Failed to write: {0}")]
    WriteError(String),

    #[error("Failed to parse record: {0}")]
    ParseError(String),

    #[error("Failed to serialize: {0}")]
    SerializeError(String),
}

/// Which upload area a binary belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    /// Post attachments, downloaded by id.
    Attachment,
    /// Inline images, served by stored filename.
    Image,
}

impl BinaryKind {
    /// Public URL for a stored binary.
    #[must_use]
    pub fn url_for(self, id: &str, stored_name: &str) -> String {
        match self {
            Self::Attachment => format!("/api/attachments/{id}/download"),
            Self::Image => format!("/static/images/{stored_name}"),
        }
    }
}

/// Result of writing a binary: its generated id, on-disk name and URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBinary {
    pub id: String,
    /// `{id}{ext}`.
    pub stored_name: String,
    pub size: u64,
    pub url: String,
}

/// A binary read back from storage.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub stored_name: String,
    pub bytes: Vec<u8>,
}

/// Directory layout for the filesystem store.
///
/// Passed explicitly at construction; there is no process-wide path state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub posts_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub images_dir: PathBuf,
}

impl StorageLayout {
    /// Standard layout beneath a single data directory.
    #[must_use]
    pub fn under(data_dir: &Path) -> Self {
        Self {
            posts_dir: data_dir.join("posts"),
            uploads_dir: data_dir.join("uploads"),
            images_dir: data_dir.join("images"),
        }
    }

    #[must_use]
    pub fn dir_for(&self, kind: BinaryKind) -> &Path {
        match kind {
            BinaryKind::Attachment => &self.uploads_dir,
            BinaryKind::Image => &self.images_dir,
        }
    }
}

/// Trait for storage backends (local filesystem, object store, etc.).
///
/// There are no update-in-place or delete operations: posts are rewritten
/// whole by `save_post`, and binaries are write-once.
pub trait StorageBackend: Send + Sync {
    /// Persist a post as a record named by its id, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::WriteError` if the medium is unwritable.
    fn save_post(&self, post: &Post) -> Result<(), StorageError>;

    /// Load a post by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown ids.
    fn get_post(&self, id: &str) -> Result<Post, StorageError>;

    /// Load every stored post. Order is unspecified.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the post directory cannot be read.
    fn list_posts(&self) -> Result<Vec<Post>, StorageError>;

    /// Write a binary under a freshly generated id.
    ///
    /// The extension of `suggested_name` is kept so the stored file can be
    /// served with the right content type.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::WriteError` if the binary cannot be written.
    fn save_binary(
        &self,
        kind: BinaryKind,
        bytes: &[u8],
        suggested_name: &str,
    ) -> Result<StoredBinary, StorageError>;

    /// Read an attachment by its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no attachment has that id.
    fn read_attachment(&self, id: &str) -> Result<StoredFile, StorageError>;

    /// Read an image by its stored filename.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no image has that name.
    fn read_image(&self, stored_name: &str) -> Result<StoredFile, StorageError>;

    /// The directory layout backing this store.
    fn layout(&self) -> &StorageLayout;
}

/// Check that an externally supplied key cannot name anything outside its
/// directory: only `[A-Za-z0-9._-]`, not empty, no leading dot.
#[must_use]
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
