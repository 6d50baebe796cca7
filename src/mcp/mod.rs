//! MCP server implementation for postdesk.
//!
//! Exposes post listing, reading, search and creation as MCP tools.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::{
    ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, ErrorCode, ErrorData as McpError, ServerCapabilities, ServerInfo,
    },
    schemars, tool, tool_handler, tool_router,
    transport::stdio,
};
use serde::Deserialize;

use crate::cli::DEFAULT_SEARCH_LIMIT;
use crate::post::NewPost;
use crate::render;
use crate::search::SearchOptions;
use crate::service::{PostService, ServiceError};

/// Parameters for `search_posts` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchParams {
    #[schemars(description = "The search query")]
    pub query: String,
    #[schemars(description = "Maximum number of results (default: 10)")]
    pub limit: Option<usize>,
    #[schemars(description = "Filter by category")]
    pub category: Option<String>,
}

/// Parameters for `list_posts` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListParams {
    #[schemars(description = "Filter by category")]
    pub category: Option<String>,
}

/// Parameters for `get_post` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetParams {
    #[schemars(description = "Post id (32 hex characters)")]
    pub id: String,
}

/// Parameters for `create_post` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateParams {
    pub title: String,
    pub department: String,
    pub author: String,
    pub category: String,
    #[schemars(description = "Post body (HTML)")]
    pub content: String,
    #[schemars(description = "Badges as a JSON array, e.g. [\"new\"]")]
    pub badges: Option<String>,
    #[schemars(description = "Expiry date (YYYY-MM-DD)")]
    pub end_date: Option<String>,
}

/// MCP server exposing postdesk tools.
#[derive(Clone)]
pub struct PostdeskServer {
    service: Arc<PostService>,
    tool_router: ToolRouter<Self>,
}

fn tool_error(action: &str, e: impl std::fmt::Display) -> McpError {
    McpError {
        code: ErrorCode::INTERNAL_ERROR,
        message: Cow::from(format!("{action} failed: {e}")),
        data: None,
    }
}

/// Run a service call on the blocking pool.
async fn blocking<T, F>(action: &str, work: F) -> Result<T, McpError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| tool_error(action, e))?
        .map_err(|e| tool_error(action, e))
}

#[tool_router]
impl PostdeskServer {
    #[must_use]
    pub fn new(service: Arc<PostService>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Search posts by title, content, department, author, category or badge")]
    async fn search_posts(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let service = Arc::clone(&self.service);
        let query = params.query.clone();
        let options = SearchOptions {
            limit: Some(params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT)),
            category: params.category,
            fuzzy: None,
        };

        let posts = blocking("Search", move || service.search_posts(&query, &options)).await?;
        Ok(CallToolResult::success(vec![Content::text(
            render::search_results(&params.query, &posts),
        )]))
    }

    #[tool(description = "List all posts, newest first")]
    async fn list_posts(
        &self,
        Parameters(params): Parameters<ListParams>,
    ) -> Result<CallToolResult, McpError> {
        let service = Arc::clone(&self.service);
        let mut posts = blocking("List", move || service.list_posts()).await?;
        if let Some(category) = params.category {
            posts.retain(|post| post.category == category);
        }

        Ok(CallToolResult::success(vec![Content::text(
            render::post_list(&posts),
        )]))
    }

    #[tool(description = "Get a post as JSON by its id. Counts as a view.")]
    async fn get_post(
        &self,
        Parameters(params): Parameters<GetParams>,
    ) -> Result<CallToolResult, McpError> {
        let service = Arc::clone(&self.service);
        let post = blocking("Get post", move || service.get_post(&params.id)).await?;
        let json = serde_json::to_string_pretty(&post).map_err(|e| tool_error("Get post", e))?;

        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Create a new post")]
    async fn create_post(
        &self,
        Parameters(params): Parameters<CreateParams>,
    ) -> Result<CallToolResult, McpError> {
        let service = Arc::clone(&self.service);
        let fields = NewPost {
            title: params.title,
            department: params.department,
            author: params.author,
            category: params.category,
            content: params.content,
            end_date: params.end_date,
            badges: params.badges,
        };

        let post = blocking("Create post", move || {
            service.create_post(fields, vec![], vec![])
        })
        .await?;

        let output = format!(
            "Created post:\n- **Title:** {}\n- **Category:** {}\n- **Id:** {}",
            post.title, post.category, post.id
        );
        Ok(CallToolResult::success(vec![Content::text(output)]))
    }
}

#[tool_handler]
impl ServerHandler for PostdeskServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "postdesk stores department posts. Use search_posts to find posts, \
                list_posts to browse, get_post to read one, and create_post to publish."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Start the MCP server with stdio transport.
///
/// # Errors
///
/// Returns an error if the server fails to start or encounters a fatal error.
pub async fn serve(service: Arc<PostService>) -> anyhow::Result<()> {
    let server = PostdeskServer::new(service);
    let running = server.serve(stdio()).await?;
    running.waiting().await?;
    Ok(())
}
