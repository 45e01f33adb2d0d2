//! HTTP endpoint that fans one request out to several backend services.
//!
//! Every `GET /` runs one dispatch per configured service, all concurrently,
//! and answers with a JSON object keyed by service name. A service whose
//! dispatch comes back empty, or with a JSON `null`, is reported as
//! `"No Response from <name>"`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{extract::State, routing::get, Json, Router};
use futures::future::join_all;
use serde_json::{Map, Value};
use tokio::net::TcpListener;

use crate::{
    call::Caller,
    client::RacingDispatcher,
    config::{Endpoint, RaceConfig, RaceMode, DEFAULT_HEDGE_DELAY},
    errors::{ConfigError, ServeError},
};

/// Primary/secondary endpoint pair serving one logical service.
#[derive(Debug, Clone)]
pub struct ServicePair {
    /// Key used for this service in the response object.
    pub name: String,
    pub primary: Endpoint,
    pub secondary: Endpoint,
}

impl ServicePair {
    pub fn new(
        name: impl Into<String>,
        primary: impl Into<Endpoint>,
        secondary: impl Into<Endpoint>,
    ) -> Self {
        Self {
            name: name.into(),
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }
}

/// Process configuration of the aggregation endpoint.
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub port: u16,
    pub mode: RaceMode,
    pub hedge_after: Duration,
    pub services: Vec<ServicePair>,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            port: 3000,
            mode: RaceMode::Standard,
            hedge_after: DEFAULT_HEDGE_DELAY,
            services: vec![
                ServicePair::new("A", "http://localhost:8081", "http://localhost:8082"),
                ServicePair::new("B", "http://localhost:8083", "http://localhost:8084"),
                ServicePair::new("C", "http://localhost:8085", "http://localhost:8086"),
            ],
        }
    }
}

impl AggregatorSettings {
    /// One validated race configuration per service, in service order.
    pub fn race_configs(&self) -> Result<Vec<(String, RaceConfig)>, ConfigError> {
        self.services
            .iter()
            .map(|svc| {
                let cfg = RaceConfig::for_mode(
                    self.mode,
                    svc.primary.clone(),
                    svc.secondary.clone(),
                    self.hedge_after,
                );
                cfg.validate()?;
                Ok((svc.name.clone(), cfg))
            })
            .collect()
    }
}

/// Shared state of the aggregation handler.
struct AggregatorState<C> {
    dispatcher: RacingDispatcher<C>,
    races: Arc<Vec<(String, RaceConfig)>>,
}

impl<C> Clone for AggregatorState<C> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            races: self.races.clone(),
        }
    }
}

/// Builds the aggregation router. Configuration errors surface here, at
/// startup, rather than per request.
pub fn router<C>(
    dispatcher: RacingDispatcher<C>,
    settings: &AggregatorSettings,
) -> Result<Router, ConfigError>
where
    C: Caller<Output = Value> + 'static,
{
    let state = AggregatorState {
        dispatcher,
        races: Arc::new(settings.race_configs()?),
    };

    Ok(Router::new()
        .route("/", get(aggregate::<C>))
        .with_state(state))
}

async fn aggregate<C>(State(state): State<AggregatorState<C>>) -> Json<Value>
where
    C: Caller<Output = Value> + 'static,
{
    let dispatches = state.races.iter().map(|(name, cfg)| {
        let dispatcher = &state.dispatcher;
        async move {
            let payload = match dispatcher.dispatch(cfg).await {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(service = %name, error = %e, "invalid race configuration");
                    None
                }
            };
            // A `null` payload is reported like a missing one.
            let value = match payload {
                Some(value) if !value.is_null() => value,
                _ => Value::String(format!("No Response from {name}")),
            };
            (name.clone(), value)
        }
    });

    let body: Map<String, Value> = join_all(dispatches).await.into_iter().collect();
    Json(Value::Object(body))
}

/// Serves the aggregation endpoint on `0.0.0.0:<port>` until the process exits.
pub async fn run<C>(settings: AggregatorSettings, caller: C) -> Result<(), ServeError>
where
    C: Caller<Output = Value> + 'static,
{
    let app = router(RacingDispatcher::new(caller), &settings)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(port = settings.port, mode = %settings.mode, "Server running on port {}", settings.port);

    axum::serve(listener, app).await?;
    Ok(())
}
