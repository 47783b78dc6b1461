//! Root-mounted storefront routes

use crate::config_cell::ConfigSnapshot;
use crate::helpers::{Helper, Helpers};
use crate::pipeline::ParsedCookies;
use crate::session::Session;
use crate::state::SharedState;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tracing::warn;

/// Plain cookie carrying the visitor's chosen locale
const LOCALE_COOKIE: &str = "locale";
const DEFAULT_LOCALE: &str = "en";
/// Signed cookie set once the visitor accepts the cookie banner
const CONSENT_COOKIE: &str = "cookieConsent";

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/settings/public", get(public_settings))
        .route("/logout", get(logout))
}

/// Health check endpoint
async fn health_check(State(state): State<SharedState>) -> Json<Value> {
    let database = match state.collections.products.count().await {
        Ok(_) => "ok",
        Err(e) => {
            warn!("Health check could not reach {}: {}", state.database.name(), e);
            "unavailable"
        }
    };

    Json(json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "settingsGeneration": state.settings.generation(),
    }))
}

/// Storefront settings safe to hand to a browser, as seen by this request
async fn public_settings(
    State(state): State<SharedState>,
    ConfigSnapshot(settings): ConfigSnapshot,
    helpers: Helpers,
    cookies: ParsedCookies,
) -> Json<Value> {
    let per_row = json!(settings.products_per_row);
    let locale = cookies
        .plain
        .get(LOCALE_COOKIE)
        .map(|c| c.value().to_string())
        .unwrap_or_else(|| DEFAULT_LOCALE.to_string());

    Json(json!({
        "cartTitle": settings.cart_title,
        "cartDescription": settings.cart_description,
        "cartLogo": settings.cart_logo,
        "baseUrl": settings.base_url,
        "theme": settings.theme,
        "themeView": helpers.call(Helper::GetTheme, &[json!("index")]).to_value(),
        "productsPerRow": settings.products_per_row,
        "productsPerPage": settings.products_per_page,
        "rowClass": helpers.call(Helper::PerRowClass, &[per_row]).to_value(),
        "menuEnabled": settings.menu_enabled,
        "currencySymbol": helpers
            .call(Helper::CurrencySymbol, &[json!(settings.currency_symbol)])
            .to_value(),
        "paymentGateway": settings.payment_gateway,
        "gateway": state.gateway.public_config(),
        "locale": locale,
        "cookieConsent": cookies.signed.get(CONSENT_COOKIE).is_some(),
    }))
}

async fn logout(session: Session) -> Json<Value> {
    session.destroy();
    Json(json!({ "success": true }))
}
