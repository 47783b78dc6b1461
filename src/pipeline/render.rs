//! Error stage
//!
//! Handlers and earlier stages report failures as `AppError`, whose response
//! carries a `PendingError` and no body. This stage logs the error in full and
//! renders it. Development responses include the detail; every other run mode
//! gets the status text and an empty detail object.

use crate::config::RunMode;
use crate::error::{AppError, PendingError};
use crate::helpers::Helpers;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use serde_json::{json, Value};
use tracing::{error, warn};

#[derive(Debug, Clone, Copy)]
pub struct ErrorRenderer {
    run_mode: RunMode,
}

impl ErrorRenderer {
    pub fn new(run_mode: RunMode) -> Self {
        Self { run_mode }
    }

    pub fn render(&self, err: &AppError) -> Value {
        let status = err.status();
        if !self.run_mode.is_development() {
            return json!({
                "message": status.canonical_reason().unwrap_or("Error"),
                "error": {},
            });
        }

        json!({
            "message": err.to_string(),
            "error": {
                "status": status.as_u16(),
                "code": err.code(),
                "message": err.to_string(),
                "chain": source_chain(err),
            },
            "helpers": Helpers::names().collect::<Vec<_>>(),
        })
    }
}

/// Messages of every error below `err`, nearest first
fn source_chain(err: &AppError) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = std::error::Error::source(err);
    while let Some(source) = current {
        chain.push(source.to_string());
        current = source.source();
    }
    chain
}

/// Log and render any error raised further down the chain
pub async fn render_errors(
    State(renderer): State<ErrorRenderer>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;
    let Some(PendingError(err)) = response.extensions_mut().remove::<PendingError>() else {
        return response;
    };

    let status = err.status();
    let chain = source_chain(&err).join(": ");
    if status.is_server_error() {
        error!(status = status.as_u16(), code = err.code(), "{} {} failed: {} {}", method, path, err, chain);
    } else {
        warn!(status = status.as_u16(), code = err.code(), "{} {} failed: {} {}", method, path, err, chain);
    }

    let body = renderer.render(&err).to_string();
    let (mut parts, _) = response.into_parts();
    parts.status = status;
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Response::from_parts(parts, Body::from(body))
}
