//! Request-scoped failure guards
//!
//! A panic raised while a request is in flight becomes a 500 and a request
//! that outlives the configured timeout becomes a 408, both rendered by the
//! error stage. The process panic hook asks `handling_request` so that only
//! panics outside request handling are fatal.

use crate::error::AppError;
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    BoxError,
};
use std::any::Any;
use std::time::Duration;
use tower::timeout::error::Elapsed;

tokio::task_local! {
    static IN_REQUEST: ();
}

/// Whether the current thread is polling a request inside the pipeline
pub fn handling_request() -> bool {
    IN_REQUEST.try_with(|_| ()).is_ok()
}

/// Mark everything below this stage as request handling
pub async fn request_scope(request: Request, next: Next) -> Response {
    IN_REQUEST.scope((), next.run(request)).await
}

/// Hand a caught panic to the error stage
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    AppError::Internal(format!("request handler panicked: {}", detail)).into_response()
}

/// Map a failure of the timeout layer to a request error
pub fn timeout_error(err: BoxError, limit: Duration) -> AppError {
    if err.is::<Elapsed>() {
        AppError::Timeout(limit)
    } else {
        AppError::Internal(format!("request failed: {}", err))
    }
}
