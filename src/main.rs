//! Process entry point for the aggregation endpoint and the dummy backends.
//!
//! ```text
//! hedged-fetch aggregator   # PORT, MODE, HEDGE_DELAY_MS, SERVICE_A..SERVICE_C2
//! hedged-fetch backend      # PORT, SERVICE_NAME
//! ```
//!
//! Logging follows `RUST_LOG`, or `LOG_LEVEL` and `LOG_FORMAT` when unset.

mod env;

use color_eyre::{eyre::bail, Result};
use env::{aggregator_settings_from_env, backend_settings_from_env, log_config_from_env};
use hedged_fetch::{aggregator, backend, telemetry, HttpCaller};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    telemetry::init_logging(&log_config_from_env()?)?;

    let role = std::env::args().nth(1);
    match role.as_deref() {
        Some("aggregator") => {
            let settings = aggregator_settings_from_env()?;
            tracing::info!(
                mode = %settings.mode,
                hedge_after_ms = settings.hedge_after.as_millis() as u64,
                services = settings.services.len(),
                "starting aggregator"
            );
            aggregator::run(settings, HttpCaller::new()).await?;
        }
        Some("backend") => {
            let settings = backend_settings_from_env()?;
            backend::run(settings).await?;
        }
        _ => {
            bail!("usage: hedged-fetch <aggregator|backend>");
        }
    }

    Ok(())
}
