//! Search backend trait, the index adapter, and shared search types.
//!
//! A [`SearchIndex`] mirrors posts into an optional external engine and
//! answers queries from it while the engine is reachable. When it is not,
//! queries fall back to a linear scan of the storage backend, which stays
//! the source of truth either way.

pub mod elastic;
pub mod scan;
#[cfg(feature = "ranked")]
pub mod tantivy;

use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;

use crate::post::Post;
use crate::search::scan::ScanBackend;
use crate::storage::{StorageBackend, StorageError};

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

/// Options for filtering and limiting search results.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub category: Option<String>,
    /// Edit distance for typo-tolerant matching (engines that support it).
    pub fuzzy: Option<u8>,
}

/// A post id returned by an engine, with its relevance score if ranked.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: Option<f32>,
}

/// The searchable projection of a post that engines store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchDocument {
    pub id: String,
    pub title: String,
    /// Content with markup removed.
    pub content: String,
    pub department: String,
    pub author: String,
    pub category: String,
    pub badges: Vec<String>,
    #[serde(rename = "postDate")]
    pub post_date: String,
}

impl From<&Post> for SearchDocument {
    fn from(post: &Post) -> Self {
        Self {
            id: post.id.clone(),
            title: post.title.clone(),
            content: strip_html(&post.content),
            department: post.department.clone(),
            author: post.author.clone(),
            category: post.category.clone(),
            badges: post.badges.clone(),
            post_date: post.post_date.clone(),
        }
    }
}

/// Trait for external full-text engines (Elasticsearch, Tantivy, etc.).
pub trait SearchBackend: Send + Sync {
    /// Short engine name for logs and status output.
    fn name(&self) -> &'static str;

    /// Check that the engine is reachable and ready to accept documents.
    ///
    /// # Errors
    ///
    /// Returns an error describing why the engine cannot be used.
    fn check_health(&self) -> anyhow::Result<()>;

    /// Add or replace a post in the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the document or is unreachable.
    fn index_post(&self, doc: &SearchDocument) -> anyhow::Result<()>;

    /// Search the engine, returning matching post ids in rank order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn search(&self, query: &str, options: &SearchOptions) -> anyhow::Result<Vec<SearchHit>>;
}

/// Whether queries are currently answered by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// No engine configured; every query is a scan.
    Disabled,
    Available,
    Unavailable,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disabled => "disabled",
            Self::Available => "available",
            Self::Unavailable => "unavailable",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
struct Health {
    state: EngineState,
    checked_at: Option<Instant>,
}

/// Search index adapter: engine when available, storage scan otherwise.
///
/// Engine availability is checked lazily and cached for `staleness`; any
/// engine error marks it unavailable until the next health check.
pub struct SearchIndex {
    engine: Option<Box<dyn SearchBackend>>,
    store: Arc<dyn StorageBackend>,
    scan: ScanBackend,
    health: Mutex<Health>,
    staleness: Duration,
}

impl SearchIndex {
    #[must_use]
    pub fn new(
        engine: Option<Box<dyn SearchBackend>>,
        store: Arc<dyn StorageBackend>,
        staleness: Duration,
    ) -> Self {
        let state = if engine.is_some() {
            EngineState::Unavailable
        } else {
            EngineState::Disabled
        };

        Self {
            engine,
            scan: ScanBackend::new(Arc::clone(&store)),
            store,
            health: Mutex::new(Health {
                state,
                checked_at: None,
            }),
            staleness,
        }
    }

    /// An index with no engine: every query scans storage.
    #[must_use]
    pub fn scan_only(store: Arc<dyn StorageBackend>) -> Self {
        Self::new(None, store, Duration::ZERO)
    }

    #[must_use]
    pub fn engine_name(&self) -> Option<&'static str> {
        self.engine.as_ref().map(|e| e.name())
    }

    /// Current engine state, re-probing if the last check is stale.
    pub fn state(&self) -> EngineState {
        let Some(engine) = &self.engine else {
            return EngineState::Disabled;
        };

        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(checked_at) = health.checked_at
            && checked_at.elapsed() < self.staleness
        {
            return health.state;
        }

        let state = match engine.check_health() {
            Ok(()) => EngineState::Available,
            Err(e) => {
                tracing::warn!(engine = engine.name(), error = %e, "search engine health check failed");
                EngineState::Unavailable
            }
        };

        if state != health.state {
            tracing::info!(engine = engine.name(), from = %health.state, to = %state, "search engine state changed");
        }

        health.state = state;
        health.checked_at = Some(Instant::now());
        state
    }

    fn mark_unavailable(&self, engine: &dyn SearchBackend, error: &anyhow::Error, action: &str) {
        tracing::warn!(engine = engine.name(), error = %error, action, "search engine error, degrading to scan");

        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        health.state = EngineState::Unavailable;
        health.checked_at = Some(Instant::now());
    }

    /// Mirror a post into the engine. Never fails: storage is authoritative
    /// and a lost index update only affects ranking until the next reindex.
    pub fn index_post(&self, post: &Post) {
        let Some(engine) = &self.engine else {
            return;
        };

        if self.state() != EngineState::Available {
            tracing::debug!(post_id = %post.id, "search engine unavailable, skipping index update");
            return;
        }

        if let Err(e) = engine.index_post(&SearchDocument::from(post)) {
            self.mark_unavailable(engine.as_ref(), &e, "index");
        }
    }

    /// Find posts matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only if storage itself fails; engine failures
    /// fall back to the scan.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<Post>, StorageError> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }

        if let Some(engine) = &self.engine
            && self.state() == EngineState::Available
        {
            match engine.search(query, options) {
                Ok(hits) => return self.resolve(hits),
                Err(e) => self.mark_unavailable(engine.as_ref(), &e, "search"),
            }
        }

        self.scan.search(query, options)
    }

    /// Load engine hits from storage, dropping ids that no longer exist.
    fn resolve(&self, hits: Vec<SearchHit>) -> Result<Vec<Post>, StorageError> {
        let mut posts = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.store.get_post(&hit.id) {
                Ok(post) => posts.push(post),
                Err(StorageError::NotFound(_)) => {
                    tracing::debug!(post_id = %hit.id, "index references missing post");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(posts)
    }

    /// Push every stored post into the engine.
    ///
    /// # Returns
    ///
    /// The number of posts indexed.
    ///
    /// # Errors
    ///
    /// Returns an error if no engine is configured, the engine is
    /// unreachable, or storage cannot be listed.
    pub fn reindex(&self) -> anyhow::Result<usize> {
        let Some(engine) = &self.engine else {
            anyhow::bail!("No search engine configured");
        };

        if self.state() != EngineState::Available {
            anyhow::bail!("Search engine '{}' is unavailable", engine.name());
        }

        let posts = self.store.list_posts()?;
        for post in &posts {
            if let Err(e) = engine.index_post(&SearchDocument::from(post)) {
                self.mark_unavailable(engine.as_ref(), &e, "reindex");
                return Err(e.context(format!("Indexing post {}", post.id)));
            }
        }

        tracing::info!(engine = engine.name(), count = posts.len(), "reindex complete");
        Ok(posts.len())
    }
}

/// Remove markup from HTML content, leaving whitespace-normalised text.
#[must_use]
pub fn strip_html(html: &str) -> String {
    let text = HTML_TAG.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageLayout;
    use crate::storage::local::LocalStorageBackend;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// In-memory engine whose reachability can be toggled.
    #[derive(Default)]
    struct FakeEngine {
        down: Arc<AtomicBool>,
        failing_search: bool,
        health_checks: Arc<AtomicUsize>,
        docs: Arc<Mutex<Vec<SearchDocument>>>,
    }

    impl SearchBackend for FakeEngine {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn check_health(&self) -> anyhow::Result<()> {
            self.health_checks.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            Ok(())
        }

        fn index_post(&self, doc: &SearchDocument) -> anyhow::Result<()> {
            if self.down.load(Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            self.docs.lock().unwrap().push(doc.clone());
            Ok(())
        }

        fn search(&self, query: &str, _options: &SearchOptions) -> anyhow::Result<Vec<SearchHit>> {
            if self.failing_search {
                anyhow::bail!("query failed");
            }
            Ok(self
                .docs
                .lock()
                .unwrap()
                .iter()
                .filter(|d| d.title.contains(query))
                .map(|d| SearchHit {
                    id: d.id.clone(),
                    score: Some(1.0),
                })
                .collect())
        }
    }

    fn store(temp_dir: &TempDir) -> Arc<dyn StorageBackend> {
        Arc::new(LocalStorageBackend::open(StorageLayout::under(temp_dir.path())).unwrap())
    }

    fn post(id: &str, title: &str) -> Post {
        Post {
            id: id.to_string(),
            title: title.to_string(),
            department: "IT부서".to_string(),
            author: "lee".to_string(),
            views: 0,
            post_date: "2024-05-01".to_string(),
            end_date: None,
            category: "notice".to_string(),
            badges: vec![],
            content: "<p>본문</p>".to_string(),
            attachments: vec![],
            uploaded_images: vec![],
        }
    }

    #[test]
    fn strip_html_removes_tags_and_entities() {
        assert_eq!(
            strip_html("<div><p>Hello&nbsp;<b>world</b></p><img src=\"/x.png\"></div>"),
            "Hello world"
        );
        assert_eq!(strip_html("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(strip_html(""), "");
    }

    #[test]
    fn search_document_strips_content() {
        let doc = SearchDocument::from(&post("p1", "제목"));
        assert_eq!(doc.content, "본문");
        assert_eq!(doc.title, "제목");
    }

    #[test]
    fn disabled_index_scans_storage() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.save_post(&post("p1", "테스트 게시물")).unwrap();
        let index = SearchIndex::scan_only(Arc::clone(&store));

        assert_eq!(index.state(), EngineState::Disabled);
        let found = index.search("테스트", &SearchOptions::default()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "p1");
    }

    #[test]
    fn available_engine_answers_queries() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let engine = FakeEngine::default();
        let docs = Arc::clone(&engine.docs);
        let index = SearchIndex::new(Some(Box::new(engine)), Arc::clone(&store), Duration::from_secs(60));

        let p = post("p1", "테스트 게시물");
        store.save_post(&p).unwrap();
        index.index_post(&p);

        assert_eq!(docs.lock().unwrap().len(), 1);
        assert_eq!(index.state(), EngineState::Available);
        let found = index.search("테스트", &SearchOptions::default()).unwrap();
        assert_eq!(found, vec![p]);
    }

    #[test]
    fn engine_hits_for_missing_posts_are_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let index = SearchIndex::new(
            Some(Box::new(FakeEngine::default())),
            Arc::clone(&store),
            Duration::from_secs(60),
        );

        // Indexed but never persisted.
        index.index_post(&post("ghost", "테스트"));

        assert!(index.search("테스트", &SearchOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn unreachable_engine_does_not_fail_indexing() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let engine = FakeEngine::default();
        engine.down.store(true, Ordering::SeqCst);
        let docs = Arc::clone(&engine.docs);
        let index = SearchIndex::new(Some(Box::new(engine)), Arc::clone(&store), Duration::from_secs(60));

        let p = post("p1", "테스트 게시물");
        store.save_post(&p).unwrap();
        index.index_post(&p);

        assert!(docs.lock().unwrap().is_empty());
        assert_eq!(index.state(), EngineState::Unavailable);
        let found = index.search("테스트", &SearchOptions::default()).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn failing_engine_query_falls_back_to_scan() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let engine = FakeEngine {
            failing_search: true,
            ..FakeEngine::default()
        };
        let index = SearchIndex::new(Some(Box::new(engine)), Arc::clone(&store), Duration::from_secs(60));
        store.save_post(&post("p1", "테스트 게시물")).unwrap();

        let found = index.search("테스트", &SearchOptions::default()).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(index.state(), EngineState::Unavailable);
    }

    #[test]
    fn state_is_cached_within_staleness_window() {
        let temp_dir = TempDir::new().unwrap();
        let engine = FakeEngine::default();
        let health_checks = Arc::clone(&engine.health_checks);
        let index = SearchIndex::new(Some(Box::new(engine)), store(&temp_dir), Duration::from_secs(60));

        index.state();
        index.state();
        index.state();

        assert_eq!(health_checks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn engine_recovers_after_staleness_window() {
        let temp_dir = TempDir::new().unwrap();
        let engine = FakeEngine::default();
        let down = Arc::clone(&engine.down);
        down.store(true, Ordering::SeqCst);
        let index = SearchIndex::new(Some(Box::new(engine)), store(&temp_dir), Duration::ZERO);

        assert_eq!(index.state(), EngineState::Unavailable);
        down.store(false, Ordering::SeqCst);
        assert_eq!(index.state(), EngineState::Available);
    }

    #[test]
    fn reindex_pushes_every_post() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let engine = FakeEngine::default();
        let docs = Arc::clone(&engine.docs);
        let index = SearchIndex::new(Some(Box::new(engine)), Arc::clone(&store), Duration::from_secs(60));

        store.save_post(&post("p1", "one")).unwrap();
        store.save_post(&post("p2", "two")).unwrap();

        assert_eq!(index.reindex().unwrap(), 2);
        assert_eq!(docs.lock().unwrap().len(), 2);
    }

    #[test]
    fn reindex_without_engine_fails() {
        let temp_dir = TempDir::new().unwrap();
        let index = SearchIndex::scan_only(store(&temp_dir));

        let err = index.reindex().unwrap_err();
        assert!(err.to_string().contains("No search engine configured"));
    }

    #[test]
    fn blank_query_returns_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        store.save_post(&post("p1", "anything")).unwrap();
        let index = SearchIndex::scan_only(store);

        assert!(index.search("   ", &SearchOptions::default()).unwrap().is_empty());
    }
}
