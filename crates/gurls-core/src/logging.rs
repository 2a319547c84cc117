use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize tracing for the bot.
///
/// `env == "production"` emits JSON lines; anything else uses the human
/// formatter. `RUST_LOG` overrides the default filter.
pub fn init(service_name: &str, env: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,gurls_core=info,gurls_grpc=info,gurls_telegram=info,{service_name}=info"
        ))
    });

    let res = if env == "production" {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(true)
            .try_init()
    };

    res.map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))
}
