//! `livedev.toml` and command-line settings.

use anyhow::Context;
use clap::Args;
use livedev_vfs::{CacheCategory, CachePolicy};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "livedev.toml";

const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_WS_ADDR: &str = "127.0.0.1:3001";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Contents of `livedev.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub project_root: Option<PathBuf>,
    pub route: Option<String>,
    pub http_addr: Option<SocketAddr>,
    pub ws_addr: Option<SocketAddr>,
    /// 0 disables request timeouts.
    pub request_timeout_ms: Option<u64>,
    /// Category name → max-age seconds.
    pub cache: Option<HashMap<CacheCategory, u64>>,
    pub index_files: Option<Vec<String>>,
}

impl FileConfig {
    /// Load `path`, or `livedev.toml` in the working directory if present.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(CONFIG_FILE), false),
        };
        if !required && !path.is_file() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Flags for `livedev serve`. Each overrides the matching file key.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Project directory to serve
    #[arg(long, env = "LIVEDEV_ROOT")]
    pub root: Option<PathBuf>,

    /// Base route pages are served under (e.g. /vfs/proj)
    #[arg(long, env = "LIVEDEV_ROUTE")]
    pub route: Option<String>,

    /// HTTP listen address
    #[arg(long, env = "LIVEDEV_HTTP_ADDR")]
    pub http_addr: Option<SocketAddr>,

    /// WebSocket listen address for page connections
    #[arg(long, env = "LIVEDEV_WS_ADDR")]
    pub ws_addr: Option<SocketAddr>,

    /// Request timeout in milliseconds (0 disables)
    #[arg(long, env = "LIVEDEV_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,
}

/// Resolved settings for one session.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_root: PathBuf,
    pub route: String,
    pub http_addr: SocketAddr,
    pub ws_addr: SocketAddr,
    pub request_timeout: Option<Duration>,
    pub cache: CachePolicy,
    pub index_files: Vec<String>,
}

impl Settings {
    pub fn resolve(file: FileConfig, args: ServeArgs) -> anyhow::Result<Self> {
        let project_root = args
            .root
            .or(file.project_root)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut route = args.route.or(file.route).unwrap_or_else(|| "/".to_string());
        if !route.starts_with('/') {
            route.insert(0, '/');
        }

        let http_addr = match args.http_addr.or(file.http_addr) {
            Some(addr) => addr,
            None => DEFAULT_HTTP_ADDR.parse()?,
        };
        let ws_addr = match args.ws_addr.or(file.ws_addr) {
            Some(addr) => addr,
            None => DEFAULT_WS_ADDR.parse()?,
        };

        let timeout_ms = args
            .timeout_ms
            .or(file.request_timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let request_timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));

        let cache = match &file.cache {
            Some(table) => CachePolicy::from_seconds(table),
            None => CachePolicy::default(),
        };
        let index_files = file
            .index_files
            .unwrap_or_else(|| vec!["index.html".to_string(), "index.htm".to_string()]);

        Ok(Self {
            project_root,
            route,
            http_addr,
            ws_addr,
            request_timeout,
            cache,
            index_files,
        })
    }
}
