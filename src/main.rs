//! Storefront server
//!
//! Boots an expressCart-style storefront: validates the settings documents,
//! prepares the database and session store, then serves the request pipeline.

mod config;
mod config_cell;
mod db;
mod error;
mod helpers;
mod pipeline;
mod routes;
mod session;
mod settings;
mod startup;
mod state;

use crate::config::AppConfig;
use crate::error::{StartupError, FATAL_EXIT_CODE};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for structured logging
    init_tracing();
    install_panic_hook();

    info!("🚀 Starting storefront server...");

    if let Err(err) = run().await {
        error!("❌ FATAL: {}", err);
        std::process::exit(err.exit_code());
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    info!("📋 Configuration loaded ({} mode)", config.run_mode);

    let state = startup::prepare(config).await?;
    startup::serve(state).await
}

/// Initialize tracing with structured logging
///
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,storefront_server=debug,tower_http=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }
}

/// Panics outside request handling are fatal, with the same exit status as
/// startup failures. Request panics are caught and rendered by the pipeline.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        if pipeline::handling_request() {
            error!("💥 Panic while handling a request: {}", panic);
            return;
        }
        error!("💥 Uncaught panic: {}", panic);
        std::process::exit(FATAL_EXIT_CODE);
    }));
}
