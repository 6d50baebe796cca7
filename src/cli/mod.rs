//! CLI interface for postdesk.
//!
//! Provides command-line argument parsing using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Engine;

/// Default number of search results to return.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Command-line interface for postdesk.
#[derive(Parser)]
#[command(name = "postdesk")]
#[command(author, version, about = "Post and attachment backend with full-text search", long_about = None)]
pub struct Cli {
    /// Config file (defaults to $POSTDESK_CONFIG, then the user config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory, overriding `storage.data_dir`.
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Search engine, overriding `search.engine`.
    #[arg(long, global = true)]
    pub engine: Option<Engine>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server.
    Serve {
        /// Address to listen on, overriding `server.bind`.
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// List all posts, newest first.
    List {
        /// Filter results to this category only.
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Show a post by id. Counts as a view.
    Get {
        /// Post id.
        id: String,
    },

    /// Search posts.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,

        /// Filter results to this category only.
        #[arg(short, long)]
        category: Option<String>,

        /// Enable fuzzy search with specified edit distance (1-2).
        #[arg(short, long)]
        fuzzy: Option<u8>,
    },

    /// Create a post.
    Create {
        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        department: String,

        #[arg(short, long)]
        author: String,

        #[arg(short = 'C', long)]
        category: String,

        /// HTML content. Read from --file or stdin if omitted.
        #[arg(long)]
        content: Option<String>,

        /// Read content from file instead of stdin.
        #[arg(short, long, conflicts_with = "content")]
        file: Option<PathBuf>,

        /// Badges as a JSON array, e.g. '["new","hot"]'.
        #[arg(short, long)]
        badges: Option<String>,

        /// Expiry date (YYYY-MM-DD).
        #[arg(short, long)]
        end_date: Option<String>,

        /// File to attach. May be repeated.
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
    },

    /// Upload an image for embedding in post content.
    UploadImage {
        /// Image file path.
        path: PathBuf,
    },

    /// Push every stored post into the search engine.
    Reindex,

    /// Start the MCP server for AI editor integration.
    #[cfg(feature = "mcp")]
    Mcp,
}
