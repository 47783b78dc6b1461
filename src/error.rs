//! Error handling module
//!
//! Two families of errors live here. `StartupError` covers everything that can
//! go wrong before the listener is bound and always terminates the process.
//! `AppError` is request-scoped: it never crashes the process and is rendered
//! by the error stage of the pipeline.

use crate::config::ConfigError;
use crate::db::DbError;
use crate::session::SessionError;
use crate::settings::{PaymentGateway, SettingsError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

/// Exit status for every startup failure and for uncaught panics.
pub const FATAL_EXIT_CODE: i32 = 2;

/// Fatal errors raised while bringing the service up
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Environment configuration incorrect: {0}")]
    Environment(#[from] ConfigError),

    #[error("settings.json incorrect: {0}")]
    Settings(#[source] SettingsError),

    #[error("{gateway} config is incorrect: {source}")]
    Gateway {
        gateway: PaymentGateway,
        #[source]
        source: SettingsError,
    },

    #[error("Error connecting to database: {0}")]
    Connection(#[source] DbError),

    #[error("Please use PostgreSQL version {floor} or above. Current version: {detected}")]
    Version { detected: u32, floor: u32 },

    #[error("Error setting up indexes: {0}")]
    Indexing(#[source] DbError),

    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

impl StartupError {
    /// Process exit status to terminate with
    pub fn exit_code(&self) -> i32 {
        FATAL_EXIT_CODE
    }
}

/// Request-scoped error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Request did not complete within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            AppError::Settings(SettingsError::Schema(_)) => StatusCode::BAD_REQUEST,
            AppError::Session(_)
            | AppError::Database(_)
            | AppError::Settings(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, shown in development error pages
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Timeout(_) => "REQUEST_TIMEOUT",
            AppError::Session(_) => "SESSION_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Settings(_) => "SETTINGS_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// An error waiting for the error stage to log and render it.
///
/// `AppError` responses leave the body empty and carry this extension instead,
/// so the verbosity decision is made in one place.
#[derive(Debug, Clone)]
pub struct PendingError(pub Arc<AppError>);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = self.status().into_response();
        response
            .extensions_mut()
            .insert(PendingError(Arc::new(self)));
        response
    }
}

/// Result type alias for route handlers
pub type ApiResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_status_and_message() {
        let err = AppError::NotFound;
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Not Found");
    }

    #[test]
    fn test_into_response_defers_rendering() {
        let response = AppError::Forbidden("admins only".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let pending = response.extensions().get::<PendingError>();
        assert!(matches!(
            pending.map(|p| p.0.as_ref()),
            Some(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_every_startup_error_exits_with_two() {
        let errors = [
            StartupError::Version {
                detected: 9,
                floor: 10,
            },
            StartupError::Serve(std::io::Error::other("boom")),
        ];
        for err in errors {
            assert_eq!(err.exit_code(), 2);
        }
    }
}
