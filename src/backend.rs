//! Dummy backend service with simulated latency.
//!
//! Answers `GET /` with `{"message": "hello from service: <name>"}` after a
//! random delay. Most requests take 40 to 100 ms; a small share picks up an
//! extra 300 to 800 ms to produce a latency tail worth hedging against.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{extract::State, routing::get, Json, Router};
use rand::Rng;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::errors::ServeError;

/// Distribution of the artificial response delay.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyProfile {
    /// Lower bound of the normal delay.
    pub base: Duration,
    /// Width of the uniform jitter added to `base`.
    pub jitter: Duration,
    /// Probability in `[0, 1]` that a request also gets a tail delay.
    pub tail_probability: f64,
    /// Lower bound of the tail delay.
    pub tail_base: Duration,
    /// Width of the uniform jitter added to `tail_base`.
    pub tail_jitter: Duration,
}

impl Default for LatencyProfile {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(40),
            jitter: Duration::from_millis(60),
            tail_probability: 0.03,
            tail_base: Duration::from_millis(300),
            tail_jitter: Duration::from_millis(500),
        }
    }
}

impl LatencyProfile {
    /// Answers immediately.
    pub fn instant() -> Self {
        Self {
            base: Duration::ZERO,
            jitter: Duration::ZERO,
            tail_probability: 0.0,
            tail_base: Duration::ZERO,
            tail_jitter: Duration::ZERO,
        }
    }

    /// Always the same delay, never a tail.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            ..Self::instant()
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let mut delay = self.base + self.jitter.mul_f64(rng.gen::<f64>());
        if self.tail_probability > 0.0 && rng.gen_bool(self.tail_probability.min(1.0)) {
            delay += self.tail_base + self.tail_jitter.mul_f64(rng.gen::<f64>());
        }
        delay
    }
}

/// Process configuration of one backend instance.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub port: u16,
    /// Name reported in every response.
    pub name: String,
    pub latency: LatencyProfile,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            port: 3000,
            name: "A".to_string(),
            latency: LatencyProfile::default(),
        }
    }
}

#[derive(Clone)]
struct BackendState {
    message: Arc<str>,
    latency: Arc<LatencyProfile>,
}

pub fn router(name: &str, latency: LatencyProfile) -> Router {
    let state = BackendState {
        message: format!("hello from service: {name}").into(),
        latency: Arc::new(latency),
    };

    Router::new().route("/", get(hello)).with_state(state)
}

// The handler future is dropped when the client disconnects, which drops the
// pending sleep with it.
async fn hello(State(state): State<BackendState>) -> Json<Value> {
    let delay = state.latency.sample(&mut rand::thread_rng());
    tokio::time::sleep(delay).await;
    Json(json!({ "message": &*state.message }))
}

/// Serves the dummy backend on `0.0.0.0:<port>` until the process exits.
pub async fn run(settings: BackendSettings) -> Result<(), ServeError> {
    let app = router(&settings.name, settings.latency);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(port = settings.port, name = %settings.name, "Service running on port {}", settings.port);

    axum::serve(listener, app).await?;
    Ok(())
}
