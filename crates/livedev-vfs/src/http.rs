//! axum adapter for [`VirtualServer`].

use crate::server::VirtualServer;
use axum::extract::State;
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use std::sync::Arc;

/// Router answering every request under the server's route.
///
/// Merge it into a larger app; paths outside the route fall through to
/// whatever else is mounted.
pub fn router(server: Arc<VirtualServer>) -> Router {
    let base = server.route().trim_end_matches('/').to_string();
    let mut paths = vec![format!("{base}/"), format!("{base}/{{*path}}")];
    if !base.is_empty() {
        paths.push(base);
    }

    paths
        .iter()
        .fold(Router::new(), |router, path| router.route(path, any(serve)))
        .with_state(server)
}

async fn serve(State(server): State<Arc<VirtualServer>>, method: Method, uri: Uri) -> Response {
    let url = uri.path_and_query().map_or(uri.path(), |p| p.as_str());
    let response = server.serve(&method, url);
    (response.status, response.headers, response.body).into_response()
}
