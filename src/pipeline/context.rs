//! Per-request settings snapshot and render helpers

use crate::config_cell::{ConfigCell, ConfigSnapshot};
use crate::error::AppError;
use crate::helpers::Helpers;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Capture the current settings for the rest of the request and attach the
/// helpers bound to them
pub async fn attach_helpers(
    State(cell): State<Arc<ConfigCell>>,
    mut request: Request,
    next: Next,
) -> Response {
    let snapshot = cell.snapshot();
    let extensions = request.extensions_mut();
    extensions.insert(Helpers::new(Arc::clone(&snapshot.0)));
    extensions.insert(snapshot);
    next.run(request).await
}

impl<S> FromRequestParts<S> for ConfigSnapshot
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ConfigSnapshot>()
            .cloned()
            .ok_or_else(|| AppError::Internal("settings snapshot is not attached".to_string()))
    }
}
