//! Console tracing setup for binaries and examples.

use crate::error::{LiveError, Result};
use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Install a console subscriber filtered by `RUST_LOG` (default `info`).
///
/// Only the first call installs anything; later calls return `Ok(())`.
///
/// # Example
/// ```
/// adk_live::telemetry::init_tracing("voice-console").unwrap();
/// ```
pub fn init_tracing(service_name: &str) -> Result<()> {
    let mut outcome = Ok(());
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        outcome = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .try_init()
            .map_err(|e| LiveError::config(format!("failed to install tracing subscriber: {}", e)));

        if outcome.is_ok() {
            tracing::info!(service.name = service_name, "Tracing initialized");
        }
    });
    outcome
}
