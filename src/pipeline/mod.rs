//! Request pipeline
//!
//! Every request passes the stages below in this order, outermost first.
//! Any stage may answer on its own instead of calling the next one.
//!
//! 1. trust proxy and hardening headers
//! 2. request id and access log
//! 3. body and cookie parsing
//! 4. session attachment
//! 5. static assets
//! 6. settings snapshot and render helpers
//! 7. settings reload, after the response is produced
//! 8. cache-control
//! 9. route mounts, then the not-found fallback
//!
//! The error stage sits just inside the access log so that failures raised by
//! any later stage, not only by routes, are logged and rendered. Directly
//! inside it, timeouts and panics are turned into errors for it to render.

mod assets;
mod body;
mod context;
mod guard;
mod reload;
mod render;
mod security;

pub use body::{ParsedBody, ParsedCookies};
pub use guard::handling_request;
pub use security::ClientAddr;

use crate::routes::Mounts;
use crate::session::{session_stage, SessionStage};
use crate::state::SharedState;
use assets::AssetRoots;
use axum::{
    error_handling::HandleErrorLayer,
    http::{header, HeaderValue},
    middleware, BoxError, Router,
};
use body::BodyParser;
use render::ErrorRenderer;
use std::sync::Arc;
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::MakeRequestUuid,
    set_header::SetResponseHeaderLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    LatencyUnit, ServiceBuilderExt,
};
use tracing::Level;

/// Value of the cache-control header on every routed response
pub const NO_CACHE: &str = "no-cache, no-store";

/// Wrap `mounts` in the full stage chain
pub fn build(state: SharedState, mounts: Mounts) -> Router {
    let config = &state.config;
    let limit = config.server.request_timeout;

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    let stages = ServiceBuilder::new()
        .layer(middleware::from_fn(security::trust_proxy))
        .layer(middleware::from_fn(security::security_headers))
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .propagate_x_request_id()
        .layer(middleware::from_fn_with_state(
            ErrorRenderer::new(config.run_mode),
            render::render_errors,
        ))
        .layer(HandleErrorLayer::new(move |err: BoxError| async move {
            guard::timeout_error(err, limit)
        }))
        .layer(TimeoutLayer::new(limit))
        .layer(CatchPanicLayer::custom(guard::panic_response))
        .layer(middleware::from_fn(guard::request_scope))
        .layer(middleware::from_fn_with_state(
            BodyParser::new(&config.secrets.cookie_secret),
            body::parse_body,
        ))
        .layer(middleware::from_fn_with_state(
            SessionStage::new(Arc::clone(&state.sessions), &config.secrets.session_secret),
            session_stage,
        ))
        .layer(middleware::from_fn_with_state(
            AssetRoots::new(&config.paths.public_dir, &config.paths.themes_dir),
            assets::serve_assets,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.settings),
            context::attach_helpers,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.settings),
            reload::reload_if_dirty,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static(NO_CACHE),
        ));

    mounts.into_router(Arc::clone(&state)).layer(stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, RunMode};
    use crate::config_cell::{ConfigCell, ConfigSnapshot};
    use crate::routes::MountPoint;
    use crate::session::{signing_key, SessionRecord, SessionStore, SESSION_COOKIE};
    use crate::settings::SettingsSource;
    use crate::state::testing::{test_state, TestState};
    use axum::body::Body;
    use axum::extract::State;
    use axum::http::{Request, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum_extra::extract::cookie::{Cookie, SignedCookieJar};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(test: &TestState) -> Router {
        build(test.state.clone(), Mounts::storefront())
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn cookie_pair(response: &Response) -> String {
        response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string()
    }

    /// A stored session with `data`, and the cookie addressing it
    async fn seeded_session(test: &TestState, data: Value) -> String {
        let mut record = SessionRecord::new(Utc::now());
        if let Value::Object(map) = data {
            record.data = map;
        }
        test.sessions.save(&record).await.unwrap();

        let key = signing_key(&AppConfig::default().secrets.session_secret);
        let jar = SignedCookieJar::new(key).add(Cookie::new(SESSION_COOKIE, record.id));
        cookie_pair(&(jar, ()).into_response())
    }

    async fn wait_for_generation(cell: &ConfigCell, generation: u64) {
        for _ in 0..100 {
            if cell.generation() >= generation {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("settings never reached generation {}", generation);
    }

    #[tokio::test]
    async fn test_unmounted_path_renders_production_404() {
        let test = test_state(RunMode::Production);
        let response = app(&test)
            .oneshot(get_request("/no/such/page", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), NO_CACHE);
        assert!(response.headers().get("x-request-id").is_some());
        for (name, value) in security::HARDENING_HEADERS {
            assert_eq!(response.headers().get(*name).unwrap(), value);
        }
        assert_eq!(
            json_body(response).await,
            json!({ "message": "Not Found", "error": {} })
        );
    }

    #[tokio::test]
    async fn test_development_404_carries_detail() {
        let test = test_state(RunMode::Development);
        let response = app(&test)
            .oneshot(get_request("/missing", None))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["error"]["status"], 404);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert!(body["helpers"].as_array().is_some());
    }

    #[tokio::test]
    async fn test_cache_control_overrides_handler_value() {
        let test = test_state(RunMode::Test);
        let mounts = Mounts::storefront().mount(
            MountPoint::Product,
            Router::new().route(
                "/cached",
                get(|| async { ([(header::CACHE_CONTROL, "max-age=3600")], "cached") }),
            ),
        );
        let response = build(test.state.clone(), mounts)
            .oneshot(get_request("/cached", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), NO_CACHE);
    }

    #[tokio::test]
    async fn test_handler_panic_is_rendered_as_server_error() {
        let test = test_state(RunMode::Production);
        let mounts = Mounts::storefront().mount(
            MountPoint::Customer,
            Router::new()
                .route(
                    "/boom",
                    get(|| async {
                        if handling_request() {
                            panic!("cart total overflowed");
                        }
                        "not in a request"
                    }),
                )
                .route("/ok", get(|| async { "still serving" })),
        );
        let app = build(test.state.clone(), mounts);

        let response = app.clone().oneshot(get_request("/boom", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get("x-request-id").is_some());
        assert_eq!(
            json_body(response).await,
            json!({ "message": "Internal Server Error", "error": {} })
        );

        let response = app.oneshot(get_request("/ok", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!handling_request());
    }

    #[tokio::test]
    async fn test_slow_handler_is_rendered_as_timeout() {
        let mut test = test_state(RunMode::Development);
        Arc::get_mut(&mut test.state)
            .unwrap()
            .config
            .server
            .request_timeout = Duration::from_millis(50);
        let mounts = Mounts::storefront().mount(
            MountPoint::Customer,
            Router::new().route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "too late"
                }),
            ),
        );

        let response = build(test.state.clone(), mounts)
            .oneshot(get_request("/slow", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "REQUEST_TIMEOUT");
        assert_eq!(body["error"]["status"], 408);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rendered_as_client_error() {
        let test = test_state(RunMode::Production);
        let response = app(&test)
            .oneshot(post_json("/admin/settings/update", None, "{oops"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({ "message": "Bad Request", "error": {} })
        );
    }

    #[tokio::test]
    async fn test_session_written_on_every_request() {
        let test = test_state(RunMode::Test);
        let first = app(&test)
            .oneshot(get_request("/settings/public", None))
            .await
            .unwrap();
        let cookie = cookie_pair(&first);
        let after_first = test.sessions.write_count();

        for expected in [after_first + 1, after_first + 2] {
            let response = app(&test)
                .oneshot(get_request("/settings/public", Some(&cookie)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(test.sessions.write_count(), expected);
        }
        assert_eq!(test.sessions.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_public_settings_use_helpers() {
        let test = test_state(RunMode::Test);
        let response = app(&test)
            .oneshot(get_request("/settings/public", None))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["cartTitle"], "expressCart");
        assert_eq!(body["themeView"], "themes/Cloth/index");
        assert_eq!(body["rowClass"], "col-md-4 col-xl-4 col m4 xl4 product-item");
        assert_eq!(body["currencySymbol"], "$");
        assert_eq!(body["gateway"]["publicKey"], "pk_test");
        assert!(body["gateway"].get("secretKey").is_none());
        assert_eq!(body["locale"], "en");
        assert_eq!(body["cookieConsent"], false);
    }

    #[tokio::test]
    async fn test_health_reports_unreachable_database() {
        let test = test_state(RunMode::Test);
        let response = app(&test).oneshot(get_request("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["database"], "unavailable");
    }

    #[tokio::test]
    async fn test_admin_update_requires_admin_session() {
        let test = test_state(RunMode::Production);
        let cookie = seeded_session(&test, json!({ "isAdmin": false })).await;
        let response = app(&test)
            .oneshot(post_json(
                "/admin/settings/update",
                Some(&cookie),
                r#"{"cartTitle": "Hijacked"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(test.source.load_count(), 0);
        assert_eq!(test.state.settings.get().cart_title, "expressCart");
    }

    #[tokio::test]
    async fn test_admin_update_reloads_after_response() {
        let test = test_state(RunMode::Test);
        let cookie = seeded_session(&test, json!({ "isAdmin": true })).await;

        let response = app(&test)
            .oneshot(post_json(
                "/admin/settings/update",
                Some(&cookie),
                r#"{"cartTitle": "Winter Sale"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.extensions().get::<crate::config_cell::ConfigDirty>().is_none());

        wait_for_generation(&test.state.settings, 1).await;
        let body = json_body(
            app(&test)
                .oneshot(get_request("/settings/public", None))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["cartTitle"], "Winter Sale");
    }

    #[tokio::test]
    async fn test_dirty_request_keeps_its_own_snapshot() {
        let test = test_state(RunMode::Test);
        let mounts = Mounts::storefront().mount(
            MountPoint::Customer,
            Router::new().route(
                "/rename",
                get(
                    |State(state): State<SharedState>, ConfigSnapshot(seen): ConfigSnapshot| async move {
                        let patch = json!({ "cartTitle": "Renamed" });
                        state
                            .settings
                            .source()
                            .update(patch.as_object().unwrap())
                            .unwrap();
                        let mut response = seen.cart_title.clone().into_response();
                        ConfigCell::mark_dirty(&mut response);
                        response
                    },
                ),
            ),
        );
        let app = build(test.state.clone(), mounts);

        let first = app.clone().oneshot(get_request("/rename", None)).await.unwrap();
        let bytes = axum::body::to_bytes(first.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"expressCart");

        wait_for_generation(&test.state.settings, 1).await;
        let second = app.oneshot(get_request("/settings/public", None)).await.unwrap();
        assert_eq!(json_body(second).await["cartTitle"], "Renamed");
    }
}
