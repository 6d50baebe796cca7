//! Tantivy-based search backend with BM25 ranking.
//!
//! An embedded alternative to an external engine: the index lives in
//! `.index/` under the data directory and is always available.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, FuzzyTermQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, STORED, STRING, Schema, TEXT, Value};
use tantivy::{Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::search::{SearchBackend, SearchDocument, SearchHit, SearchOptions};

/// Default index directory name within the data directory.
pub const INDEX_DIR: &str = ".index";

/// Default heap size for index writer (50MB).
const WRITER_HEAP_SIZE: usize = 50_000_000;

/// Result cap when the caller gives no limit.
const DEFAULT_LIMIT: usize = 100;

/// Schema field handles for the Tantivy index.
#[derive(Debug, Clone)]
struct SchemaFields {
    id: Field,
    title: Field,
    content: Field,
    department: Field,
    author: Field,
    category: Field,
    badges: Field,
}

/// Tantivy-based search backend with BM25 ranking.
pub struct TantivyBackend {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: SchemaFields,
    index_path: PathBuf,
}

impl TantivyBackend {
    /// Build the Tantivy schema for posts.
    ///
    /// Only `id` is stored; posts are loaded from storage by id.
    fn build_schema() -> (Schema, SchemaFields) {
        let mut schema_builder = Schema::builder();

        let id = schema_builder.add_text_field("id", STRING | STORED);
        let title = schema_builder.add_text_field("title", TEXT);
        let content = schema_builder.add_text_field("content", TEXT);
        let department = schema_builder.add_text_field("department", TEXT);
        let author = schema_builder.add_text_field("author", TEXT);
        let category = schema_builder.add_text_field("category", STRING);
        let badges = schema_builder.add_text_field("badges", TEXT);

        let schema = schema_builder.build();
        let fields = SchemaFields {
            id,
            title,
            content,
            department,
            author,
            category,
            badges,
        };

        (schema, fields)
    }

    /// Open or create a Tantivy index at the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be opened, created, or locked
    /// for writing.
    pub fn open(index_path: &Path) -> anyhow::Result<Self> {
        let index = if index_path.exists() {
            let directory = MmapDirectory::open(index_path)?;
            Index::open(directory)?
        } else {
            let (schema, _) = Self::build_schema();
            std::fs::create_dir_all(index_path)?;
            let directory = MmapDirectory::open(index_path)?;
            Index::create(directory, schema, IndexSettings::default())?
        };

        // Field handles come from the stored schema, not a fresh build.
        let schema = index.schema();
        let fields = SchemaFields {
            id: schema.get_field("id")?,
            title: schema.get_field("title")?,
            content: schema.get_field("content")?,
            department: schema.get_field("department")?,
            author: schema.get_field("author")?,
            category: schema.get_field("category")?,
            badges: schema.get_field("badges")?,
        };

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;
        let writer = index.writer(WRITER_HEAP_SIZE)?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
            index_path: index_path.to_path_buf(),
        })
    }

    /// Open or create the index beneath a data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be opened or created.
    pub fn open_in(data_dir: &Path) -> anyhow::Result<Self> {
        Self::open(&data_dir.join(INDEX_DIR))
    }

    #[must_use]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    fn text_fields(&self) -> [Field; 5] {
        [
            self.fields.title,
            self.fields.content,
            self.fields.department,
            self.fields.author,
            self.fields.badges,
        ]
    }

    /// One `Should` fuzzy clause per word and text field. Transpositions
    /// count as a single edit.
    fn build_fuzzy_query(&self, query_str: &str, distance: u8) -> Box<dyn Query> {
        let clauses: Vec<(Occur, Box<dyn Query>)> = query_str
            .split_whitespace()
            .flat_map(|word| {
                let word = word.to_lowercase();
                self.text_fields().map(|field| {
                    let term = Term::from_field_text(field, &word);
                    (
                        Occur::Should,
                        Box::new(FuzzyTermQuery::new(term, distance, true)) as Box<dyn Query>,
                    )
                })
            })
            .collect();

        Box::new(BooleanQuery::new(clauses))
    }

    fn build_query(&self, query_str: &str, options: &SearchOptions) -> Box<dyn Query> {
        let text_query: Box<dyn Query> = if let Some(distance) = options.fuzzy {
            self.build_fuzzy_query(query_str, distance)
        } else {
            let mut parser = QueryParser::for_index(&self.index, self.text_fields().to_vec());
            parser.set_field_boost(self.fields.title, 2.0);
            // User input may contain query syntax; keep whatever parses.
            let (query, errors) = parser.parse_query_lenient(query_str);
            if !errors.is_empty() {
                tracing::debug!(?errors, "ignored unparsable parts of query");
            }
            query
        };

        match &options.category {
            Some(category) => {
                let term = Term::from_field_text(self.fields.category, category);
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, text_query),
                    (
                        Occur::Must,
                        Box::new(TermQuery::new(term, IndexRecordOption::Basic)),
                    ),
                ]))
            }
            None => text_query,
        }
    }
}

impl SearchBackend for TantivyBackend {
    fn name(&self) -> &'static str {
        "tantivy"
    }

    fn check_health(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn index_post(&self, doc: &SearchDocument) -> anyhow::Result<()> {
        let mut tantivy_doc = TantivyDocument::new();
        tantivy_doc.add_text(self.fields.id, &doc.id);
        tantivy_doc.add_text(self.fields.title, &doc.title);
        tantivy_doc.add_text(self.fields.content, &doc.content);
        tantivy_doc.add_text(self.fields.department, &doc.department);
        tantivy_doc.add_text(self.fields.author, &doc.author);
        tantivy_doc.add_text(self.fields.category, &doc.category);
        tantivy_doc.add_text(self.fields.badges, doc.badges.join(" "));

        {
            let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            writer.delete_term(Term::from_field_text(self.fields.id, &doc.id));
            writer.add_document(tantivy_doc)?;
            writer.commit()?;
        }

        self.reader.reload()?;
        Ok(())
    }

    fn search(&self, query: &str, options: &SearchOptions) -> anyhow::Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }

        let searcher = self.reader.searcher();
        let limit = options.limit.unwrap_or(DEFAULT_LIMIT);
        let tantivy_query = self.build_query(query, options);
        let top_docs = searcher.search(&tantivy_query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            if let Some(id) = doc.get_first(self.fields.id).and_then(|v| v.as_str()) {
                hits.push(SearchHit {
                    id: id.to_string(),
                    score: Some(score),
                });
            }
        }

        Ok(hits)
    }
}
