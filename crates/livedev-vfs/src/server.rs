//! Virtual web server answering requests under a base route.

use crate::cache::{CachePolicy, ResponseCache};
use crate::mime;
use crate::path::{self, PathError};
use crate::store::VirtualFileStore;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

/// Rewrites HTML entry points before they are served.
pub trait HtmlInstrumenter: Send + Sync + 'static {
    /// `path` is project-relative; `html` is the stored source.
    fn instrument(&self, path: &str, html: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base route, e.g. `/vfs/proj`. `/` serves everything.
    pub route: String,
    /// Default documents tried, in order, for directory URLs.
    pub index_files: Vec<String>,
    pub cache: CachePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            route: "/".to_string(),
            index_files: vec!["index.html".to_string(), "index.htm".to_string()],
            cache: CachePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServeError {
    #[error("url is outside the virtual route")]
    NotRouted,
    #[error("forbidden: {0}")]
    Forbidden(PathError),
    #[error("bad path: {0}")]
    BadPath(PathError),
    #[error("not found: /{0}")]
    NotFound(String),
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotRouted | Self::BadPath(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl From<PathError> for ServeError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::Escapes => Self::Forbidden(err),
            PathError::Undecodable | PathError::Invalid => Self::BadPath(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VirtualResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl VirtualResponse {
    fn error(err: &ServeError) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        if matches!(err, ServeError::MethodNotAllowed(_)) {
            headers.insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        }
        let status = err.status();
        // Reason phrase only; never echo resolved paths.
        let body = Bytes::from(status.canonical_reason().unwrap_or("error").to_string());
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

pub struct VirtualServer {
    route: String,
    index_files: Vec<String>,
    store: Arc<VirtualFileStore>,
    cache: ResponseCache,
    instrumenter: RwLock<Option<Arc<dyn HtmlInstrumenter>>>,
}

impl VirtualServer {
    pub fn new(config: ServerConfig, store: Arc<VirtualFileStore>) -> Self {
        let route = config.route.trim_end_matches('/').to_string();
        Self {
            route,
            index_files: config.index_files,
            store,
            cache: ResponseCache::new(config.cache),
            instrumenter: RwLock::new(None),
        }
    }

    pub fn with_instrumenter(self, instrumenter: impl HtmlInstrumenter) -> Self {
        self.set_instrumenter(Some(Arc::new(instrumenter)));
        self
    }

    /// Swap the instrumenter. Cached documents are dropped.
    pub fn set_instrumenter(&self, instrumenter: Option<Arc<dyn HtmlInstrumenter>>) {
        *self.instrumenter.write() = instrumenter;
        self.cache.clear();
    }

    /// Base route with a leading slash and no trailing slash (`/` for the root).
    pub fn route(&self) -> &str {
        if self.route.is_empty() { "/" } else { &self.route }
    }

    pub fn store(&self) -> &Arc<VirtualFileStore> {
        &self.store
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn should_serve(&self, url: &str) -> bool {
        self.relative(url).is_some()
    }

    /// URL for a project-relative path under this server's route.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.route, path.trim_start_matches('/'))
    }

    /// Answer `method url`. Failures become 4xx responses.
    pub fn serve(&self, method: &Method, url: &str) -> VirtualResponse {
        match self.try_serve(method, url) {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(%method, url, "virtual serve failed: {}", err);
                VirtualResponse::error(&err)
            }
        }
    }

    pub fn try_serve(&self, method: &Method, url: &str) -> Result<VirtualResponse, ServeError> {
        let head = *method == Method::HEAD;
        if !head && *method != Method::GET {
            return Err(ServeError::MethodNotAllowed(method.clone()));
        }
        let resolved = self.resolve_url(url)?;

        let (body, version, modified) = match self.cache.get(&resolved) {
            Some(hit) => (hit.body, hit.version, hit.modified),
            None => {
                let entry = self
                    .store
                    .get(&resolved)
                    .ok_or_else(|| ServeError::NotFound(resolved.clone()))?;
                let body = self.render(&resolved, &entry.bytes);
                self.cache
                    .fill(&self.store, &resolved, &entry, body.clone());
                (body, entry.version, entry.modified)
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(mime::content_type(&resolved)),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if let Ok(etag) = HeaderValue::from_str(&format!("\"{version}\"")) {
            headers.insert(header::ETAG, etag);
        }
        if let Ok(date) = HeaderValue::from_str(&http_date(modified)) {
            headers.insert(header::LAST_MODIFIED, date);
        }

        Ok(VirtualResponse {
            status: StatusCode::OK,
            headers,
            body: if head { Bytes::new() } else { body },
        })
    }

    /// Project path `url` would be served from, after default documents.
    pub fn resolve_url(&self, url: &str) -> Result<String, ServeError> {
        let relative = self.relative(url).ok_or(ServeError::NotRouted)?;
        let wants_dir = relative.is_empty() || relative.ends_with('/');
        let normalized = path::decode(relative)?;
        self.resolve(&normalized, wants_dir)
    }

    /// Replace a project file and drop any cached rendering of it.
    pub fn write_file(&self, path: &str, bytes: impl Into<Bytes>) -> Result<String, PathError> {
        let path = self.store.write(path, bytes)?;
        self.cache.evict(&path);
        tracing::debug!(path = %path, "virtual file written");
        Ok(path)
    }

    pub fn remove_file(&self, path: &str) -> Result<bool, PathError> {
        let removed = self.store.remove(path)?;
        if let Some(path) = &removed {
            self.cache.evict(path);
            tracing::debug!(path = %path, "virtual file removed");
        }
        Ok(removed.is_some())
    }

    /// Path below the route, or `None` if `url` is not under it.
    fn relative<'a>(&self, url: &'a str) -> Option<&'a str> {
        let path = path::strip_origin(path::strip_query(url));
        let rest = path.strip_prefix(self.route.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    fn resolve(&self, normalized: &str, wants_dir: bool) -> Result<String, ServeError> {
        if !wants_dir && self.store.get(normalized).is_some() {
            return Ok(normalized.to_string());
        }
        if wants_dir || self.store.is_dir(normalized) {
            for index in &self.index_files {
                let candidate = if normalized.is_empty() {
                    index.clone()
                } else {
                    format!("{normalized}/{index}")
                };
                if self.store.get(&candidate).is_some() {
                    return Ok(candidate);
                }
            }
        }
        Err(ServeError::NotFound(normalized.to_string()))
    }

    fn render(&self, path: &str, bytes: &Bytes) -> Bytes {
        if !mime::is_html(path) {
            return bytes.clone();
        }
        let Some(instrumenter) = self.instrumenter.read().clone() else {
            return bytes.clone();
        };
        let html = String::from_utf8_lossy(bytes);
        Bytes::from(instrumenter.instrument(path, &html))
    }
}

fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
