//! Post-response settings reload

use crate::config_cell::ConfigCell;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Run the rest of the chain, then reload the settings if the response asked
/// for it. The response is returned without waiting for the reload.
pub async fn reload_if_dirty(
    State(cell): State<Arc<ConfigCell>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    // the handle is dropped; the reload finishes on its own
    let _ = cell.reload_if_dirty(&mut response);
    response
}
