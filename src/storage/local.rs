//! Local filesystem storage backend.
//!
//! One pretty-printed JSON file per post under `posts/`, one file per binary
//! under `uploads/` or `images/`, each named by its generated id.

use std::fs;
use std::path::{Path, PathBuf};

use crate::post::{Post, generate_id, split_extension};
use crate::storage::{
    BinaryKind, StorageBackend, StorageError, StorageLayout, StoredBinary, StoredFile, is_safe_key,
};

const RECORD_EXTENSION: &str = "json";

/// Storage backend for local filesystem operations.
#[derive(Debug)]
pub struct LocalStorageBackend {
    layout: StorageLayout,
}

impl LocalStorageBackend {
    /// Open a store over the given layout, creating missing directories.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::WriteError` if a directory cannot be created.
    pub fn open(layout: StorageLayout) -> Result<Self, StorageError> {
        for dir in [&layout.posts_dir, &layout.uploads_dir, &layout.images_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                StorageError::WriteError(format!("create dir {}: {e}", dir.display()))
            })?;
        }

        Ok(Self { layout })
    }

    fn post_path(&self, id: &str) -> PathBuf {
        self.layout
            .posts_dir
            .join(format!("{id}.{RECORD_EXTENSION}"))
    }

    fn read_post_file(path: &Path) -> Result<Post, StorageError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| StorageError::ReadError(format!("{}: {e}", path.display())))?;

        serde_json::from_str(&contents)
            .map_err(|e| StorageError::ParseError(format!("{}: {e}", path.display())))
    }

    fn read_file(path: &Path) -> Result<StoredFile, StorageError> {
        let bytes = fs::read(path)
            .map_err(|e| StorageError::ReadError(format!("{}: {e}", path.display())))?;
        let stored_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(StoredFile { stored_name, bytes })
    }
}

impl StorageBackend for LocalStorageBackend {
    fn save_post(&self, post: &Post) -> Result<(), StorageError> {
        if !is_safe_key(&post.id) {
            return Err(StorageError::WriteError(format!(
                "invalid post id: {}",
                post.id
            )));
        }

        let path = self.post_path(&post.id);
        let contents = serde_json::to_string_pretty(post)
            .map_err(|e| StorageError::SerializeError(e.to_string()))?;

        // Readers only ever see a complete record: write aside, then rename over.
        let tmp_path = self
            .layout
            .posts_dir
            .join(format!(".{}.{}.tmp", post.id, generate_id()));

        fs::write(&tmp_path, contents)
            .map_err(|e| StorageError::WriteError(format!("{}: {e}", tmp_path.display())))?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StorageError::WriteError(format!("{}: {e}", path.display()))
        })
    }

    fn get_post(&self, id: &str) -> Result<Post, StorageError> {
        if !is_safe_key(id) {
            return Err(StorageError::NotFound(format!("post {id}")));
        }

        let path = self.post_path(id);
        if !path.exists() {
            return Err(StorageError::NotFound(format!("post {id}")));
        }

        Self::read_post_file(&path)
    }

    fn list_posts(&self) -> Result<Vec<Post>, StorageError> {
        let dir = &self.layout.posts_dir;
        let entries = fs::read_dir(dir)
            .map_err(|e| StorageError::ReadError(format!("{}: {e}", dir.display())))?;

        let mut posts = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| StorageError::ReadError(format!("{}: {e}", dir.display())))?;
            let path = entry.path();

            let is_record = path
                .extension()
                .is_some_and(|ext| ext == RECORD_EXTENSION)
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_record {
                continue;
            }

            match Self::read_post_file(&path) {
                Ok(post) => posts.push(post),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable post record"),
            }
        }

        Ok(posts)
    }

    fn save_binary(
        &self,
        kind: BinaryKind,
        bytes: &[u8],
        suggested_name: &str,
    ) -> Result<StoredBinary, StorageError> {
        let id = generate_id();
        let (_, ext) = split_extension(suggested_name);
        let ext = if is_safe_key(&format!("x{ext}")) { ext } else { "" };
        let stored_name = format!("{id}{ext}");

        let path = self.layout.dir_for(kind).join(&stored_name);
        fs::write(&path, bytes)
            .map_err(|e| StorageError::WriteError(format!("{}: {e}", path.display())))?;

        tracing::debug!(?kind, %stored_name, size = bytes.len(), "stored binary");

        Ok(StoredBinary {
            url: kind.url_for(&id, &stored_name),
            id,
            stored_name,
            size: bytes.len() as u64,
        })
    }

    fn read_attachment(&self, id: &str) -> Result<StoredFile, StorageError> {
        if !is_safe_key(id) {
            return Err(StorageError::NotFound(format!("attachment {id}")));
        }

        let dir = &self.layout.uploads_dir;
        let entries = fs::read_dir(dir)
            .map_err(|e| StorageError::ReadError(format!("{}: {e}", dir.display())))?;

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if split_extension(&name).0 == id {
                return Self::read_file(&entry.path());
            }
        }

        Err(StorageError::NotFound(format!("attachment {id}")))
    }

    fn read_image(&self, stored_name: &str) -> Result<StoredFile, StorageError> {
        if !is_safe_key(stored_name) {
            return Err(StorageError::NotFound(format!("image {stored_name}")));
        }

        let path = self.layout.images_dir.join(stored_name);
        if !path.is_file() {
            return Err(StorageError::NotFound(format!("image {stored_name}")));
        }

        Self::read_file(&path)
    }

    fn layout(&self) -> &StorageLayout {
        &self.layout
    }
}
