use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use postdesk::api::{self, AppState};
use postdesk::cli::{Cli, Commands};
use postdesk::config::Config;
use postdesk::post::{NewPost, Upload, guess_image_type};
use postdesk::render;
use postdesk::search::SearchOptions;
use postdesk::service::PostService;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::parse_from(["postdesk", "--help"]);
        return Ok(());
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(engine) = cli.engine {
        config.search.engine = engine;
    }

    postdesk::logging::init(config.logging.json);

    // Built outside any runtime: the Elasticsearch client is blocking.
    let service = Arc::new(PostService::from_config(&config)?);

    match command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let addr: SocketAddr = bind
                .parse()
                .with_context(|| format!("Invalid bind address '{bind}'"))?;

            tracing::info!(
                engine = service.search_engine().unwrap_or("none"),
                search = %service.search_state(),
                "search engine checked"
            );

            let router = api::create_router(
                AppState {
                    service: Arc::clone(&service),
                },
                config.server.max_upload_bytes,
            );
            tokio::runtime::Runtime::new()?.block_on(api::serve(addr, router))
        }
        Commands::List { category } => {
            let mut posts = service.list_posts()?;
            if let Some(category) = category {
                posts.retain(|post| post.category == category);
            }
            println!("{}", render::post_list(&posts));
            Ok(())
        }
        Commands::Get { id } => {
            let post = service.get_post(&id)?;
            println!("{}", serde_json::to_string_pretty(&post)?);
            Ok(())
        }
        Commands::Search {
            query,
            limit,
            category,
            fuzzy,
        } => {
            let options = SearchOptions {
                limit: Some(limit),
                category,
                fuzzy,
            };
            let posts = service.search_posts(&query, &options)?;
            println!("{}", render::search_results(&query, &posts));
            Ok(())
        }
        Commands::Create {
            title,
            department,
            author,
            category,
            content,
            file,
            badges,
            end_date,
            attachments,
        } => {
            let content = match (content, file) {
                (Some(content), _) => content,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Cannot read {}", path.display()))?,
                (None, None) => {
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };

            let files = attachments
                .iter()
                .map(|path| read_upload(path))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let fields = NewPost {
                title,
                department,
                author,
                category,
                content,
                end_date,
                badges,
            };
            let post = service.create_post(fields, files, vec![])?;
            println!("{}", serde_json::to_string_pretty(&post)?);
            Ok(())
        }
        Commands::UploadImage { path } => {
            let image = read_upload(&path)?;
            let uploaded = service.upload_image(image)?;
            println!("Uploaded {} as {}", uploaded.filename, uploaded.url);
            Ok(())
        }
        Commands::Reindex => {
            let count = service.reindex()?;
            println!("Indexed {count} post(s)");
            Ok(())
        }
        #[cfg(feature = "mcp")]
        Commands::Mcp => {
            tokio::runtime::Runtime::new()?.block_on(postdesk::mcp::serve(Arc::clone(&service)))
        }
    }
}

/// Read a local file as an upload, typing images by extension.
fn read_upload(path: &Path) -> anyhow::Result<Upload> {
    let bytes = std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content_type = guess_image_type(&filename);

    Ok(Upload::new(filename, content_type, bytes))
}
