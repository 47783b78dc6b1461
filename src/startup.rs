//! Bootstrap sequence
//!
//! Validates the settings documents, connects to and prepares the database,
//! initializes the session store and only then binds the listener. Any failure
//! before the listener is bound aborts the process; nothing partial is served.

use crate::config::AppConfig;
use crate::config_cell::ConfigCell;
use crate::db::{self, Collections, Connection, MIN_SERVER_MAJOR};
use crate::error::StartupError;
use crate::pipeline;
use crate::routes::Mounts;
use crate::session::{spawn_sweeper, PgSessionStore, SessionStore};
use crate::settings::{load_startup_config, FileSettingsSource};
use crate::state::{AppState, SharedState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

/// How often expired sessions are purged from the store
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Run every startup step in order and assemble the shared state
pub async fn prepare(config: AppConfig) -> Result<SharedState, StartupError> {
    let source = Arc::new(FileSettingsSource::new(&config.paths.config_dir));
    let validated = load_startup_config(&source)?;

    let connection = Connection::connect(&validated.settings.database_connection_string)
        .await
        .map_err(StartupError::Connection)?;

    let detected = connection
        .server_major_version()
        .await
        .map_err(StartupError::Connection)?;
    check_server_version(detected)?;
    info!("🐘 PostgreSQL major version {}", detected);

    let database = db::select_database(&connection, config.run_mode)
        .await
        .map_err(StartupError::Connection)?;
    let collections = Collections::bind(&database);
    db::indexing::run_indexing(&collections)
        .await
        .map_err(StartupError::Indexing)?;

    let sessions = PgSessionStore::new(database.pool().clone());
    sessions.initialize().await.map_err(StartupError::Indexing)?;
    let sessions: Arc<dyn SessionStore> = Arc::new(sessions);

    let settings = Arc::new(ConfigCell::new(validated.settings, source));
    let state = Arc::new(AppState::new(
        config,
        database,
        collections,
        Arc::clone(&sessions),
        settings,
        validated.gateway,
    ));

    spawn_sweeper(sessions, SESSION_SWEEP_INTERVAL);
    Ok(state)
}

/// Refuse servers older than the supported floor
fn check_server_version(detected: u32) -> Result<(), StartupError> {
    if detected < MIN_SERVER_MAJOR {
        return Err(StartupError::Version {
            detected,
            floor: MIN_SERVER_MAJOR,
        });
    }
    Ok(())
}

/// Bind the listener and serve until a shutdown signal arrives
pub async fn serve(state: SharedState) -> Result<(), StartupError> {
    let addr = SocketAddr::from((state.config.server.host, state.config.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;

    let app = pipeline::build(Arc::clone(&state), Mounts::storefront());

    info!("🌐 Storefront listening on http://{}", addr);
    info!("   mode: {}, database: {}", state.config.run_mode, state.database.name());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(StartupError::Serve)?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
