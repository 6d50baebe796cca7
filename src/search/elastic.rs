//! Elasticsearch search backend over its REST API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, anyhow};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::search::{SearchBackend, SearchDocument, SearchHit, SearchOptions};

/// Result cap when the caller gives no limit.
const DEFAULT_RESULT_SIZE: usize = 100;

/// Fields queried, with title boosted over body text.
const QUERY_FIELDS: [&str; 6] = [
    "title^2",
    "content",
    "department",
    "author",
    "category",
    "badges",
];

/// Search backend backed by an Elasticsearch cluster.
pub struct ElasticBackend {
    base_url: String,
    index: String,
    http: Client,
    index_ready: AtomicBool,
}

impl ElasticBackend {
    /// Create a client for `base_url` storing posts in `index`.
    ///
    /// No request is made until the first health check.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or index name is empty, or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, index: &str, timeout: Duration) -> anyhow::Result<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            anyhow::bail!("Elasticsearch URL is empty");
        }
        if index.trim().is_empty() {
            anyhow::bail!("Elasticsearch index name is empty");
        }

        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("Building Elasticsearch HTTP client")?;

        Ok(Self {
            base_url: trimmed.trim_end_matches('/').to_string(),
            index: index.trim().to_string(),
            http,
            index_ready: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Create the posts index with its mapping if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster rejects the lookup or the creation.
    pub fn ensure_index(&self) -> anyhow::Result<()> {
        let resp = self.request(Method::HEAD, &format!("/{}", self.index)).send()?;

        if resp.status() == StatusCode::NOT_FOUND {
            let create = self
                .request(Method::PUT, &format!("/{}", self.index))
                .json(&index_mapping())
                .send()?;
            ensure_success(create)?;
            tracing::info!(index = %self.index, "created search index");
            return Ok(());
        }

        ensure_success(resp)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.http.request(method, url)
    }
}

impl SearchBackend for ElasticBackend {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    fn check_health(&self) -> anyhow::Result<()> {
        let resp = self
            .request(Method::GET, "/")
            .send()
            .with_context(|| format!("Elasticsearch at {} unreachable", self.base_url))?;
        ensure_success(resp)?;

        if !self.index_ready.load(Ordering::Acquire) {
            self.ensure_index()?;
            self.index_ready.store(true, Ordering::Release);
        }

        Ok(())
    }

    fn index_post(&self, doc: &SearchDocument) -> anyhow::Result<()> {
        let resp = self
            .request(Method::PUT, &format!("/{}/_doc/{}", self.index, doc.id))
            .query(&[("refresh", "wait_for")])
            .json(doc)
            .send()?;
        ensure_success(resp)
    }

    fn search(&self, query: &str, options: &SearchOptions) -> anyhow::Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Ok(vec![]);
        }

        let resp = self
            .request(Method::POST, &format!("/{}/_search", self.index))
            .json(&build_query(query, options))
            .send()?;

        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("elasticsearch error: {status} - {body}"));
        }

        parse_hits(&body)
    }
}

/// Index settings and field mapping for post documents.
fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "title": { "type": "text", "analyzer": "standard" },
                "content": { "type": "text", "analyzer": "standard" },
                "department": { "type": "keyword" },
                "author": { "type": "keyword" },
                "category": { "type": "keyword" },
                "badges": { "type": "keyword" },
                "postDate": { "type": "date", "format": "yyyy-MM-dd" }
            }
        }
    })
}

fn build_query(query: &str, options: &SearchOptions) -> Value {
    let mut multi_match = json!({
        "query": query,
        "fields": QUERY_FIELDS,
    });
    if let Some(distance) = options.fuzzy {
        multi_match["fuzziness"] = json!(distance);
    }

    let mut bool_query = json!({ "must": [{ "multi_match": multi_match }] });
    if let Some(category) = &options.category {
        bool_query["filter"] = json!([{ "term": { "category": category } }]);
    }

    json!({
        "size": options.limit.unwrap_or(DEFAULT_RESULT_SIZE),
        "_source": false,
        "query": { "bool": bool_query },
    })
}

#[derive(Debug, Deserialize)]
struct EsSearchResponse {
    hits: EsHits,
}

#[derive(Debug, Deserialize)]
struct EsHits {
    #[serde(default)]
    hits: Vec<EsHit>,
}

#[derive(Debug, Deserialize)]
struct EsHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: Option<f32>,
}

fn parse_hits(body: &str) -> anyhow::Result<Vec<SearchHit>> {
    let parsed: EsSearchResponse =
        serde_json::from_str(body).context("Parsing Elasticsearch search response")?;

    Ok(parsed
        .hits
        .hits
        .into_iter()
        .map(|hit| SearchHit {
            id: hit.id,
            score: hit.score,
        })
        .collect())
}

fn ensure_success(resp: Response) -> anyhow::Result<()> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().unwrap_or_default();
    Err(anyhow!("elasticsearch error: {status} - {body}"))
}
