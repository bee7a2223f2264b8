//! Logging configuration using tracing.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::StrongboxError;

/// Initialize logging with the specified level
///
/// `RUST_LOG` takes precedence over `level`. Events go to stderr so that
/// command output on stdout stays machine-readable.
pub fn init(level: &str) -> Result<(), StrongboxError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .map_err(|e| StrongboxError::Config(format!("Failed to initialize logging: {}", e)))
}
