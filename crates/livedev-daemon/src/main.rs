//! Live preview server.
//!
//! Serves a project directory from memory, instruments its HTML pages and
//! keeps open pages in sync with the files as they change.
//!
//! Run:
//!   cargo run -p livedev-daemon -- serve --root ./site --route /vfs/proj
//!
//! Then open http://127.0.0.1:3000/vfs/proj/ and edit files under ./site.
//!
//! To inspect the instrumentation pass:
//!   cargo run -p livedev-daemon -- instrument ./site/index.html --map

mod config;
mod session;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{FileConfig, ServeArgs, Settings};
use livedev_protocol::{Dispatcher, DispatcherConfig, Method};
use livedev_transport_ws::WebSocketTransport;
use livedev_vfs::{ProjectWatcher, ServerConfig, VirtualFileStore, VirtualServer, load_dir};
use session::Session;
use std::future::IntoFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "livedev")]
#[command(about = "Live preview server for static web projects")]
struct Cli {
    /// Config file (defaults to ./livedev.toml when present)
    #[arg(long, short, env = "LIVEDEV_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve a project with live preview
    Serve(ServeArgs),

    /// Print a file's instrumented HTML
    Instrument {
        file: PathBuf,

        /// Print the tag map as JSON instead
        #[arg(long)]
        map: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("livedev=info".parse()?))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let file = FileConfig::load(cli.config.as_deref())?;
            serve(Settings::resolve(file, args)?).await
        }
        Command::Instrument { file, map } => instrument(&file, map),
    }
}

fn instrument(file: &Path, map: bool) -> anyhow::Result<()> {
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let result = livedev_instrument::instrument(&name, &html);
    if map {
        println!("{}", serde_json::to_string_pretty(&result.tags)?);
    } else {
        print!("{}", result.html);
    }
    Ok(())
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let store = Arc::new(VirtualFileStore::new());
    let server = Arc::new(VirtualServer::new(
        ServerConfig {
            route: settings.route.clone(),
            index_files: settings.index_files.clone(),
            cache: settings.cache.clone(),
        },
        store,
    ));
    load_dir(&settings.project_root, &server)?;

    let dispatcher = Dispatcher::spawn(DispatcherConfig {
        request_timeout: settings.request_timeout,
    });
    let transport = WebSocketTransport::bind(settings.ws_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.ws_addr))?;
    dispatcher.set_transport(transport).await?;
    let bootstrap = dispatcher.remote_script().await?.unwrap_or_default();

    dispatcher.on(Method::ConnectionConnect, |event| {
        tracing::info!("Page connected: {} {}", event.client, event.params["url"]);
    })?;
    dispatcher.on(Method::ConnectionClose, |event| {
        tracing::info!("Page disconnected: {}", event.client);
    })?;
    dispatcher.on(Method::ConsoleMessage, |event| {
        let level = event.params["level"].as_str().unwrap_or("log");
        let text = event.params["text"].as_str().unwrap_or_default();
        tracing::info!(client = %event.client, level, "console: {}", text);
    })?;

    let session = Session::new(dispatcher, server.clone(), bootstrap);
    let mut watcher = ProjectWatcher::start(&settings.project_root, server.clone())?;

    let listener = tokio::net::TcpListener::bind(settings.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.http_addr))?;
    tracing::info!(
        "Serving {} on http://{}{}",
        settings.project_root.display(),
        settings.http_addr,
        server.route()
    );
    let app = livedev_vfs::http::router(server);

    tokio::select! {
        result = axum::serve(listener, app).into_future() => result?,
        _ = async {
            while let Some(change) = watcher.next().await {
                session.apply(&change).await;
            }
        } => tracing::warn!("Watcher stopped"),
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }
    Ok(())
}
