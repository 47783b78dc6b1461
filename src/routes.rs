//! Route mounts
//!
//! Collaborator routers are tried in a fixed order. A request that no route of
//! a mount matches, by path or by method, falls through to the next mount, and
//! past the last one to the not-found fallback.

mod admin;
mod index;

use crate::error::AppError;
use crate::settings::PaymentGateway;
use crate::state::SharedState;
use axum::{extract::Request, response::Response, Router};
use tower::ServiceExt;

/// Where a collaborator router is attached, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountPoint {
    Index,
    Customer,
    Product,
    Order,
    User,
    Admin,
    Paypal,
    Stripe,
    Authorizenet,
}

impl MountPoint {
    pub const PRECEDENCE: [MountPoint; 9] = [
        MountPoint::Index,
        MountPoint::Customer,
        MountPoint::Product,
        MountPoint::Order,
        MountPoint::User,
        MountPoint::Admin,
        MountPoint::Paypal,
        MountPoint::Stripe,
        MountPoint::Authorizenet,
    ];

    /// Path prefix of a gateway mount; the rest sit at the root
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            MountPoint::Paypal => Some(PaymentGateway::Paypal.mount_prefix()),
            MountPoint::Stripe => Some(PaymentGateway::Stripe.mount_prefix()),
            MountPoint::Authorizenet => Some(PaymentGateway::Authorizenet.mount_prefix()),
            _ => None,
        }
    }

    fn position(&self) -> usize {
        Self::PRECEDENCE
            .iter()
            .position(|point| point == self)
            .unwrap_or_default()
    }
}

/// The routers attached at each mount point
#[derive(Default)]
pub struct Mounts {
    routers: [Option<Router<SharedState>>; 9],
}

impl Mounts {
    /// The collaborators this service ships with
    pub fn storefront() -> Self {
        Self::default()
            .mount(MountPoint::Index, index::router())
            .mount(MountPoint::Admin, admin::router())
    }

    /// Attach `router` at `point`, replacing whatever was there
    pub fn mount(mut self, point: MountPoint, router: Router<SharedState>) -> Self {
        let router = match point.prefix() {
            Some(prefix) => Router::new().nest(prefix, router),
            None => router,
        };
        self.routers[point.position()] = Some(router);
        self
    }

    /// Chain the mounts so each falls through to the next, ending in not-found
    pub fn into_router(self, state: SharedState) -> Router {
        let mut chain = Router::new().fallback(not_found);
        for router in self.routers.into_iter().rev().flatten() {
            let rest = chain.clone();
            chain = router
                .method_not_allowed_fallback(move |request: Request| forward(rest.clone(), request))
                .with_state(state.clone())
                .fallback_service(chain);
        }
        chain
    }
}

/// Hand a request the current mount matched by path only to the later mounts
async fn forward(rest: Router, request: Request) -> Response {
    match rest.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

async fn not_found() -> AppError {
    AppError::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use crate::error::PendingError;
    use crate::state::testing::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::{get, post};

    async fn body_text(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_only_gateways_are_prefixed() {
        let prefixed: Vec<_> = MountPoint::PRECEDENCE
            .iter()
            .filter_map(|point| point.prefix())
            .collect();
        assert_eq!(prefixed, vec!["/paypal", "/stripe", "/authorizenet"]);
    }

    #[tokio::test]
    async fn test_first_matching_mount_wins() {
        let state = test_state(RunMode::Test).state;
        let customer = Router::new().route("/shared", get(|| async { "customer" }));
        let product = Router::new()
            .route("/shared", get(|| async { "product" }))
            .route("/only-product", get(|| async { "product" }));
        let router = Mounts::default()
            .mount(MountPoint::Product, product)
            .mount(MountPoint::Customer, customer)
            .into_router(state);

        assert_eq!(body_text(router.clone(), "/shared").await.1, "customer");
        assert_eq!(body_text(router, "/only-product").await.1, "product");
    }

    #[tokio::test]
    async fn test_method_mismatch_falls_through_to_later_mount() {
        let state = test_state(RunMode::Test).state;
        let router = Mounts::default()
            .mount(
                MountPoint::Customer,
                Router::new().route("/cart", get(|| async { "customer-get" })),
            )
            .mount(
                MountPoint::Product,
                Router::new().route("/cart", post(|| async { "product-post" })),
            )
            .into_router(state);

        let send = |method: &str| {
            Request::builder()
                .method(method)
                .uri("/cart")
                .body(Body::empty())
                .unwrap()
        };

        let response = router.clone().oneshot(send("POST")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"product-post");

        let response = router.clone().oneshot(send("GET")).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"customer-get");

        let response = router.oneshot(send("DELETE")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(matches!(
            response.extensions().get::<PendingError>().map(|p| p.0.as_ref()),
            Some(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_gateway_mounts_are_prefixed() {
        let state = test_state(RunMode::Test).state;
        let router = Mounts::default()
            .mount(MountPoint::Stripe, Router::new().route("/checkout", get(|| async { "stripe" })))
            .into_router(state);

        assert_eq!(
            body_text(router.clone(), "/stripe/checkout").await,
            (StatusCode::OK, "stripe".to_string())
        );
        assert_eq!(body_text(router, "/checkout").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unmatched_path_is_not_found() {
        let state = test_state(RunMode::Test).state;
        let response = Mounts::storefront()
            .into_router(state)
            .oneshot(Request::builder().uri("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(matches!(
            response.extensions().get::<PendingError>().map(|p| p.0.as_ref()),
            Some(AppError::NotFound)
        ));
    }
}
