use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins over the default `fusionbot=info,warn` filter.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fusionbot=info,warn"));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if logging.json {
        registry
            .with(fmt::layer().with_ansi(false).with_target(true).json())
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).compact())
            .try_init()
    };

    result.map_err(|e| anyhow!("Failed to initialise tracing: {}", e))
}
