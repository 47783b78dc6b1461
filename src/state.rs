//! Application state management
//!
//! Everything here is built once by startup and shared read-only across
//! requests. The settings cell is the only part that changes after startup.

use crate::config::AppConfig;
use crate::config_cell::ConfigCell;
use crate::db::{Collections, DatabaseHandle};
use crate::session::SessionStore;
use crate::settings::GatewaySettings;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Process configuration from the environment
    pub config: AppConfig,

    /// The database chosen for this run mode
    pub database: DatabaseHandle,

    /// Collection handles, bound once
    pub collections: Collections,

    pub sessions: Arc<dyn SessionStore>,

    /// Hot-reloadable storefront settings
    pub settings: Arc<ConfigCell>,

    /// Settings of the active payment gateway
    pub gateway: GatewaySettings,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        database: DatabaseHandle,
        collections: Collections,
        sessions: Arc<dyn SessionStore>,
        settings: Arc<ConfigCell>,
        gateway: GatewaySettings,
    ) -> Self {
        Self {
            config,
            database,
            collections,
            sessions,
            settings,
            gateway,
        }
    }
}

/// Shared state type alias
pub type SharedState = Arc<AppState>;
