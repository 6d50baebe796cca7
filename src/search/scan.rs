//! Linear-scan search over the storage backend.
//!
//! Used whenever no engine is configured or the engine is unreachable.

use std::sync::Arc;

use crate::post::Post;
use crate::search::{SearchOptions, strip_html};
use crate::storage::{StorageBackend, StorageError};

/// Case-insensitive substring search across every stored post.
pub struct ScanBackend {
    store: Arc<dyn StorageBackend>,
}

impl ScanBackend {
    #[must_use]
    pub fn new(store: Arc<dyn StorageBackend>) -> Self {
        Self { store }
    }

    /// Scan all posts for `query`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if posts cannot be listed.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<Post>, StorageError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(vec![]);
        }

        let mut results: Vec<Post> = self
            .store
            .list_posts()?
            .into_iter()
            .filter(|post| {
                options
                    .category
                    .as_ref()
                    .is_none_or(|cat| &post.category == cat)
            })
            .filter(|post| matches(post, &needle))
            .collect();

        sort_newest_first(&mut results);

        if let Some(limit) = options.limit {
            results.truncate(limit);
        }

        Ok(results)
    }
}

/// Whether a post contains the already-lowercased `needle` in any
/// searchable field.
#[must_use]
pub fn matches(post: &Post, needle: &str) -> bool {
    let contains = |text: &str| text.to_lowercase().contains(needle);

    contains(&post.title)
        || contains(&strip_html(&post.content))
        || contains(&post.department)
        || contains(&post.author)
        || contains(&post.category)
        || post.badges.iter().any(|b| contains(b))
}

/// Order posts by `postDate` descending, ties by id, for stable listings.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.post_date.cmp(&a.post_date).then_with(|| a.id.cmp(&b.id)));
}
