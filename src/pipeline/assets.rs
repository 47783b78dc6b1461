//! Static assets from the public and theme roots

use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use std::path::Path;
use tower::ServiceExt;
use tower_http::services::ServeDir;

/// Asset roots, searched in order
#[derive(Clone)]
pub struct AssetRoots {
    roots: Vec<ServeDir>,
}

impl AssetRoots {
    pub fn new(public_dir: &Path, themes_dir: &Path) -> Self {
        Self {
            roots: [public_dir, themes_dir]
                .into_iter()
                .map(|dir| ServeDir::new(dir).append_index_html_on_directories(false))
                .collect(),
        }
    }
}

/// Bodiless copy of `request` to probe a root with
fn probe(request: &Request) -> Request {
    let mut probe = Request::new(Body::empty());
    *probe.method_mut() = request.method().clone();
    *probe.uri_mut() = request.uri().clone();
    *probe.headers_mut() = request.headers().clone();
    probe
}

/// Serve the first root holding the requested file; fall through when none does
pub async fn serve_assets(State(assets): State<AssetRoots>, request: Request, next: Next) -> Response {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return next.run(request).await;
    }

    for root in &assets.roots {
        let response = match root.clone().oneshot(probe(&request)).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        if response.status() != StatusCode::NOT_FOUND {
            return response.map(Body::new);
        }
    }

    next.run(request).await
}
