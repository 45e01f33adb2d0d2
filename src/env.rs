//! Environment configuration for the aggregator and backend processes.

use std::{env, str::FromStr, time::Duration};

use color_eyre::{eyre::eyre, Result};
use hedged_fetch::{
    aggregator::{AggregatorSettings, ServicePair},
    backend::BackendSettings,
    telemetry::{LogConfig, LogFormat},
    Endpoint, RaceMode,
};

/// Reads `key`, treating an empty value as unset.
fn lookup_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_port(raw: Option<String>) -> Result<u16> {
    match raw {
        None => Ok(3000),
        Some(raw) => raw
            .trim()
            .parse::<u16>()
            .map_err(|_| eyre!("Invalid port: {raw}")),
    }
}

/// Builds the aggregator settings from `lookup`.
///
/// Recognised keys:
/// - `PORT` (default `3000`)
/// - `MODE`: `standard`, `tied` or `hedged` (default `standard`; unknown
///   values fall back to `standard`)
/// - `HEDGE_DELAY_MS` (default `94`)
/// - `SERVICE_A`, `SERVICE_A2`, `SERVICE_B`, `SERVICE_B2`, `SERVICE_C`,
///   `SERVICE_C2` (default `http://localhost:8081` through `:8086`)
pub fn aggregator_settings_from(lookup: impl Fn(&str) -> Option<String>) -> Result<AggregatorSettings> {
    let defaults = AggregatorSettings::default();

    let mode = match lookup("MODE") {
        None => RaceMode::Standard,
        Some(raw) => RaceMode::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to standard mode");
            RaceMode::Standard
        }),
    };

    let hedge_after = match lookup("HEDGE_DELAY_MS") {
        None => defaults.hedge_after,
        Some(raw) => Duration::from_millis(
            raw.trim()
                .parse::<u64>()
                .map_err(|_| eyre!("Invalid HEDGE_DELAY_MS: {raw}"))?,
        ),
    };

    let services = defaults
        .services
        .into_iter()
        .map(|svc| {
            let primary_key = format!("SERVICE_{}", svc.name);
            let secondary_key = format!("SERVICE_{}2", svc.name);
            ServicePair {
                primary: lookup(&primary_key).map(Endpoint::from).unwrap_or(svc.primary),
                secondary: lookup(&secondary_key).map(Endpoint::from).unwrap_or(svc.secondary),
                name: svc.name,
            }
        })
        .collect();

    Ok(AggregatorSettings {
        port: parse_port(lookup("PORT"))?,
        mode,
        hedge_after,
        services,
    })
}

pub fn aggregator_settings_from_env() -> Result<AggregatorSettings> {
    aggregator_settings_from(lookup_env)
}

/// Builds the backend settings from `lookup`: `PORT` (default `3000`) and
/// `SERVICE_NAME` (default `A`).
pub fn backend_settings_from(lookup: impl Fn(&str) -> Option<String>) -> Result<BackendSettings> {
    let defaults = BackendSettings::default();
    Ok(BackendSettings {
        port: parse_port(lookup("PORT"))?,
        name: lookup("SERVICE_NAME").unwrap_or(defaults.name),
        latency: defaults.latency,
    })
}

pub fn backend_settings_from_env() -> Result<BackendSettings> {
    backend_settings_from(lookup_env)
}

/// Logging setup from `LOG_FORMAT` (`text` or `json`) and `LOG_LEVEL`.
pub fn log_config_from_env() -> Result<LogConfig> {
    let defaults = LogConfig::default();
    let format = match lookup_env("LOG_FORMAT") {
        None => LogFormat::default(),
        Some(raw) => raw.parse::<LogFormat>()?,
    };
    Ok(LogConfig {
        format,
        level: lookup_env("LOG_LEVEL").unwrap_or(defaults.level),
    })
}
