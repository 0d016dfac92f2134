//! Tally Terminal - the point-of-sale data daemon.
//!
//! Hosts the data-synchronization core on kiosk hardware: probes backend
//! reachability, serves reads from the backend or the local snapshot,
//! queues writes while offline and reconciles them once connectivity
//! returns. UI and card-reader processes attach to this daemon.
//!
//! # Configuration
//!
//! Everything is environment-driven; see `tally-sync`'s config module.
//! Credentials live in a JSON file next to the binary by default.
//!
//! # Exit codes
//!
//! - `1` - unexpected fatal error (signal handlers could not be installed)
//! - `2` - configuration error (bad environment, missing credentials file)
//! - `3` - backend reachable but rejected the terminal credentials

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally_sync::controller::StartupError;
use tally_sync::{Credentials, DataController, SyncConfig};

/// Configuration could not be loaded.
const EXIT_CONFIG: u8 = 2;
/// The backend refused the terminal's credentials.
const EXIT_AUTH_REJECTED: u8 = 3;

#[derive(Parser)]
#[command(name = "tally-terminal")]
#[command(author, version, about = "Tally point-of-sale terminal daemon")]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long)]
    json_logs: bool,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
///
/// Enabled only when `SENTRY_DSN` is set; kiosks in the field usually run
/// without it.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok()?;

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Initialize tracing with `EnvFilter` and Sentry integration.
///
/// Defaults to info level for our crates if `RUST_LOG` is not set.
fn init_tracing(json_logs: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tally_terminal=info,tally_sync=info".into());

    let json_layer = json_logs.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!json_logs).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry::integrations::tracing::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Sentry must come up before the tracing subscriber.
    let _sentry_guard = init_sentry();
    init_tracing(cli.json_logs);

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let credentials = match Credentials::load(&config.credentials_path) {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load credentials");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    tracing::info!(backend = %config.backend_url, "Starting terminal data core");

    let controller = Arc::new(DataController::new(&config, credentials));
    match controller.start().await {
        Ok(()) => {}
        Err(e @ StartupError::AuthRejected(_)) => {
            tracing::error!(error = %e, "Startup aborted");
            return ExitCode::from(EXIT_AUTH_REJECTED);
        }
    }

    tracing::info!(mode = ?controller.mode(), "Terminal data core running");

    if let Err(e) = shutdown_signal().await {
        tracing::error!(error = %e, "Signal handling failed, shutting down");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Errors
///
/// Returns an error when a signal handler cannot be installed; the
/// daemon cannot shut down cleanly without one.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?
            .recv()
            .await;
        Ok::<(), std::io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = async { std::future::pending::<std::io::Result<()>>().await };

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        result = terminate => result?,
    }

    tracing::info!("Shutdown signal received, shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specific_exit_codes_leave_the_generic_failure_distinct() {
        assert_ne!(EXIT_CONFIG, 1);
        assert_ne!(EXIT_AUTH_REJECTED, 1);
        assert_ne!(EXIT_CONFIG, EXIT_AUTH_REJECTED);
    }
}
