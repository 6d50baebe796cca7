//! postdesk - a post and attachment backend with optional full-text search.
//!
//! Posts are stored as JSON files, attachments and images as files named by
//! random ids. An external search engine (Elasticsearch, or an embedded
//! Tantivy index) mirrors posts when reachable; searches fall back to a scan
//! of storage when it is not.
//!
//! # Modules
//!
//! - [`service`] - Post operations (create, list, get, search, upload)
//! - [`post`] - Post, attachment and image types
//! - [`storage`] - Storage backend trait and filesystem implementation
//! - [`search`] - Search engine trait, index adapter and implementations
//! - [`api`] - HTTP routes and handlers
//! - [`config`] - Configuration loading
//! - [`cli`] - Command-line interface definitions
//! - [`render`] - Plain-text post listings for the CLI and MCP tools

pub mod api;
pub mod cli;
pub mod config;
pub mod logging;
pub mod post;
pub mod render;
pub mod search;
pub mod service;
pub mod storage;

#[cfg(feature = "mcp")]
pub mod mcp;
