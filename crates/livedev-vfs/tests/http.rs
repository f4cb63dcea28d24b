use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use livedev_vfs::{ServerConfig, VirtualFileStore, VirtualServer, http};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> (Arc<VirtualServer>, Router) {
    let config = ServerConfig {
        route: "/vfs/proj".to_string(),
        ..ServerConfig::default()
    };
    let server = Arc::new(VirtualServer::new(config, Arc::new(VirtualFileStore::new())));
    let app = http::router(server.clone()).route("/health", get(|| async { "ok" }));
    (server, app)
}

async fn send(app: &Router, method: &str, uri: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

#[tokio::test]
async fn serves_index_html_from_the_store() {
    let (server, app) = app();
    server.write_file("index.html", "<h1>Hi</h1>").unwrap();

    let response = send(&app, "GET", "/vfs/proj/index.html").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
    assert_eq!(body(response).await, b"<h1>Hi</h1>");
}

#[tokio::test]
async fn directory_urls_get_the_index() {
    let (server, app) = app();
    server.write_file("index.html", "home").unwrap();

    for uri in ["/vfs/proj", "/vfs/proj/", "/vfs/proj/?v=2"] {
        let response = send(&app, "GET", uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(body(response).await, b"home");
    }
}

#[tokio::test]
async fn encoded_traversal_is_forbidden() {
    let (server, app) = app();
    server.write_file("index.html", "home").unwrap();

    let response = send(&app, "GET", "/vfs/proj/%2e%2e/%2e%2e/etc/passwd").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body(response).await, b"Forbidden");
}

#[tokio::test]
async fn write_then_serve_returns_new_bytes() {
    let (server, app) = app();
    server.write_file("a.html", "first").unwrap();
    assert_eq!(body(send(&app, "GET", "/vfs/proj/a.html").await).await, b"first");

    server.write_file("a.html", "second").unwrap();
    assert_eq!(body(send(&app, "GET", "/vfs/proj/a.html").await).await, b"second");
    assert_eq!(body(send(&app, "GET", "/vfs/proj/a.html").await).await, b"second");
}

#[tokio::test]
async fn other_routes_pass_through() {
    let (_server, app) = app();
    let response = send(&app, "GET", "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await, b"ok");

    let response = send(&app, "GET", "/elsewhere/a.html").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn head_and_unsupported_methods() {
    let (server, app) = app();
    server.write_file("site.css", "p{}").unwrap();

    let response = send(&app, "HEAD", "/vfs/proj/site.css").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
    assert!(body(response).await.is_empty());

    let response = send(&app, "DELETE", "/vfs/proj/site.css").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn concurrent_writes_never_serve_a_mix() {
    let (server, app) = app();
    let old = "a".repeat(64 * 1024);
    let new = "b".repeat(64 * 1024);
    server.write_file("big.txt", old.clone()).unwrap();

    let writer = {
        let server = server.clone();
        let (old, new) = (old.clone(), new.clone());
        tokio::spawn(async move {
            for i in 0..50 {
                let next = if i % 2 == 0 { new.clone() } else { old.clone() };
                server.write_file("big.txt", next).unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    for _ in 0..50 {
        let bytes = body(send(&app, "GET", "/vfs/proj/big.txt").await).await;
        assert!(bytes == old.as_bytes() || bytes == new.as_bytes());
    }
    writer.await.unwrap();
}
