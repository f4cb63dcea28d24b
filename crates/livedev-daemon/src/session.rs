//! One live-preview session: pages, protocol and project files wired together.

use livedev_core::ClientId;
use livedev_instrument::{ApplyEdits, DocumentUpdate, LiveDocument, REMOTE_RUNTIME, inject_scripts};
use livedev_protocol::{Dispatcher, Method, Target};
use livedev_vfs::{ChangeKind, HtmlInstrumenter, ProjectChange, VirtualServer, mime};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

type Documents = Arc<Mutex<HashMap<String, LiveDocument>>>;

/// Instruments served pages and remembers them for later diffs.
struct PreviewInstrumenter {
    documents: Documents,
    bootstrap: String,
}

impl HtmlInstrumenter for PreviewInstrumenter {
    fn instrument(&self, path: &str, html: &str) -> String {
        let document = LiveDocument::new(path, html);
        let out = inject_scripts(document.html(), &[&self.bootstrap, REMOTE_RUNTIME]);
        self.documents.lock().insert(path.to_string(), document);
        out
    }
}

/// What a project change means for the open pages.
#[derive(Debug, Clone, PartialEq)]
pub enum Push {
    Nothing,
    /// `DOM.applyEdits` to pages showing `path`.
    Edits { path: String, params: Value },
    /// `Page.reload` to pages showing `path`, or every page.
    Reload { path: Option<String> },
    /// `CSS.setStylesheetText` for the stylesheet at `path`.
    Stylesheet { path: String, text: String },
}

#[derive(Clone)]
pub struct Session {
    dispatcher: Dispatcher,
    server: Arc<VirtualServer>,
    documents: Documents,
}

impl Session {
    /// Install the page instrumenter on `server`. `bootstrap` is the
    /// transport's remote script.
    pub fn new(dispatcher: Dispatcher, server: Arc<VirtualServer>, bootstrap: String) -> Self {
        let documents = Documents::default();
        server.set_instrumenter(Some(Arc::new(PreviewInstrumenter {
            documents: documents.clone(),
            bootstrap,
        })));
        Self {
            dispatcher,
            server,
            documents,
        }
    }

    /// Decide how to reflect `change` in the open pages.
    pub fn plan(&self, change: &ProjectChange) -> Push {
        let path = change.path.clone();
        if change.kind == ChangeKind::Removed {
            let was_open = self.documents.lock().remove(&path).is_some();
            return Push::Reload {
                path: was_open.then_some(path),
            };
        }

        match mime::content_type(&path) {
            "text/html" => {
                let Some(entry) = self.server.store().get(&path) else {
                    return Push::Nothing;
                };
                let source = String::from_utf8_lossy(&entry.bytes).into_owned();
                let mut documents = self.documents.lock();
                let Some(document) = documents.get_mut(&path) else {
                    // Never served, so no page shows it.
                    return Push::Nothing;
                };
                match document.update(source) {
                    DocumentUpdate::Unchanged => Push::Nothing,
                    DocumentUpdate::Edits(edits) => {
                        match serde_json::to_value(ApplyEdits { edits }) {
                            Ok(params) => Push::Edits { path, params },
                            Err(e) => {
                                tracing::warn!("Cannot encode edits for {}: {}", path, e);
                                Push::Reload { path: Some(path) }
                            }
                        }
                    }
                    DocumentUpdate::Reload => Push::Reload { path: Some(path) },
                }
            }
            "text/css" => match self.server.store().get(&path) {
                Some(entry) => Push::Stylesheet {
                    text: String::from_utf8_lossy(&entry.bytes).into_owned(),
                    path,
                },
                None => Push::Nothing,
            },
            _ => Push::Reload { path: None },
        }
    }

    /// Plan `change` and send the result to the affected pages.
    pub async fn apply(&self, change: &ProjectChange) {
        let push = self.plan(change);
        tracing::debug!(path = %change.path, ?push, "project change");
        match push {
            Push::Nothing => {}
            Push::Edits { path, params } => {
                let clients = self.clients_showing(&path).await;
                self.send(Method::DomApplyEdits, params, clients);
            }
            Push::Reload { path: Some(path) } => {
                let clients = self.clients_showing(&path).await;
                self.send(Method::PageReload, json!({}), clients);
            }
            Push::Reload { path: None } => {
                let clients = self.all_clients().await;
                self.send(Method::PageReload, json!({}), clients);
            }
            Push::Stylesheet { path, text } => {
                for (client, page_url) in self.pages().await {
                    let url = match page_url.as_deref().and_then(origin) {
                        Some(origin) => format!("{origin}{}", self.server.url_for(&path)),
                        None => self.server.url_for(&path),
                    };
                    self.send(
                        Method::CssSetStylesheetText,
                        json!({ "url": url, "text": text }),
                        vec![client],
                    );
                }
            }
        }
    }

    /// Pages currently showing `path`.
    async fn clients_showing(&self, path: &str) -> Vec<ClientId> {
        self.pages()
            .await
            .into_iter()
            .filter(|(_, url)| {
                url.as_deref()
                    .and_then(|url| self.server.resolve_url(url).ok())
                    .is_some_and(|shown| shown == path)
            })
            .map(|(client, _)| client)
            .collect()
    }

    async fn all_clients(&self) -> Vec<ClientId> {
        self.pages().await.into_iter().map(|(c, _)| c).collect()
    }

    async fn pages(&self) -> Vec<(ClientId, Option<String>)> {
        match self.dispatcher.connections().await {
            Ok(connections) => connections
                .into_iter()
                .map(|c| (c.client_id, c.navigated_url))
                .collect(),
            Err(e) => {
                tracing::warn!("Dispatcher unavailable: {}", e);
                Vec::new()
            }
        }
    }

    /// Fire a request without blocking the change loop on the answers.
    fn send(&self, method: Method, params: Value, clients: Vec<ClientId>) {
        if clients.is_empty() {
            return;
        }
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            match dispatcher
                .request_all(method, params, Target::Clients(clients))
                .await
            {
                Ok(replies) => {
                    for reply in replies {
                        if let Err(e) = reply.outcome {
                            tracing::warn!(client = %reply.client, %method, "push failed: {}", e);
                        }
                    }
                }
                Err(e) => tracing::warn!(%method, "push failed: {}", e),
            }
        });
    }
}

/// `scheme://authority` of an absolute URL.
fn origin(url: &str) -> Option<&str> {
    let scheme_end = url.find("://")? + 3;
    let end = url[scheme_end..]
        .find(['/', '?', '#'])
        .map_or(url.len(), |i| scheme_end + i);
    Some(&url[..end])
}
