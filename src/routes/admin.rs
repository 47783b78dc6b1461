//! Admin routes

use crate::config_cell::ConfigCell;
use crate::error::{ApiResult, AppError};
use crate::helpers::is_true;
use crate::pipeline::{ClientAddr, ParsedBody};
use crate::session::Session;
use crate::state::SharedState;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Session key set by the user routes on admin login
pub const ADMIN_FLAG: &str = "isAdmin";

pub fn router() -> Router<SharedState> {
    Router::new().route("/admin/settings/update", post(update_settings))
}

fn require_admin(session: &Session) -> ApiResult<()> {
    match session.get(ADMIN_FLAG) {
        Some(flag) if is_true(&flag) => Ok(()),
        _ => Err(AppError::Forbidden("Access denied".to_string())),
    }
}

/// Merge the posted fields into settings.json; the settings cell reloads
/// once this response has gone out
async fn update_settings(
    State(state): State<SharedState>,
    session: Session,
    ClientAddr(client): ClientAddr,
    ParsedBody(body): ParsedBody,
) -> ApiResult<Response> {
    require_admin(&session)?;

    let Value::Object(patch) = body else {
        return Err(AppError::BadRequest(
            "expected an object of settings fields".to_string(),
        ));
    };

    let source = Arc::clone(state.settings.source());
    let updated = tokio::task::spawn_blocking(move || source.update(&patch))
        .await
        .map_err(|e| AppError::Internal(format!("settings update task failed: {}", e)))??;

    info!(
        "⚙️  Settings updated by session {} from {} (theme: {})",
        session.id(),
        client.map_or_else(|| "unknown".to_string(), |ip| ip.to_string()),
        updated.theme
    );

    let mut response = Json(json!({
        "message": "Settings successfully updated",
        "settings": {
            "cartTitle": updated.cart_title,
            "theme": updated.theme,
        },
    }))
    .into_response();
    ConfigCell::mark_dirty(&mut response);
    Ok(response)
}
