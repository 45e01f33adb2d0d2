use std::{net::SocketAddr, time::Duration};

use axum::{http::StatusCode, routing::get, Json, Router};
use hedged_fetch::{
    aggregator::{self, AggregatorSettings, ServicePair},
    backend::{self, LatencyProfile},
    CallError, Caller, Endpoint, HttpCaller, RaceConfig, RaceMode, RacingDispatcher, ServeError,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_backend(name: &str, latency: LatencyProfile) -> String {
    spawn(backend::router(name, latency)).await
}

async fn spawn_failing() -> String {
    spawn(Router::new().route("/", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))).await
}

async fn spawn_null() -> String {
    spawn(Router::new().route("/", get(|| async { Json(Value::Null) }))).await
}

/// An address nothing listens on.
async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn hello(name: &str) -> Value {
    json!({ "message": format!("hello from service: {name}") })
}

#[tokio::test]
async fn http_caller_decodes_backend_payload() {
    let url = spawn_backend("X", LatencyProfile::instant()).await;

    let value = HttpCaller::new()
        .call(&Endpoint::new(url), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(value, hello("X"));
}

#[tokio::test]
async fn http_caller_treats_error_status_as_failure() {
    let url = spawn_failing().await;

    let err = HttpCaller::new()
        .call(&Endpoint::new(url), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CallError::Status(500)), "{err:?}");
}

#[tokio::test]
async fn http_caller_reports_connection_errors() {
    let url = dead_address().await;

    let err = HttpCaller::new()
        .call(&Endpoint::new(url), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CallError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn http_caller_stops_when_cancelled() {
    let url = spawn_backend("slow", LatencyProfile::fixed(Duration::from_secs(30))).await;
    let cancel = CancellationToken::new();

    let caller = HttpCaller::new();
    let endpoint = Endpoint::new(url);
    let call = caller.call(&endpoint, cancel.clone());
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    };

    let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(call, canceller) })
        .await
        .expect("cancelled call must return promptly");

    assert!(matches!(result, Err(CallError::Cancelled)));
}

#[tokio::test]
async fn hedged_dispatch_over_http_prefers_fast_secondary() {
    let slow = spawn_backend("slow", LatencyProfile::fixed(Duration::from_secs(30))).await;
    let fast = spawn_backend("fast", LatencyProfile::instant()).await;
    let dispatcher = RacingDispatcher::new(HttpCaller::new());

    let cfg = RaceConfig::hedged(slow.as_str(), fast.as_str(), Duration::from_millis(20));
    let result = tokio::time::timeout(Duration::from_secs(5), dispatcher.dispatch(&cfg))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result, Some(hello("fast")));
    assert_eq!(dispatcher.endpoint_stats()[&Endpoint::new(slow)].cancellations, 1);
}

#[tokio::test]
async fn tied_dispatch_over_http_survives_one_failing_backend() {
    let failing = spawn_failing().await;
    let ok = spawn_backend("ok", LatencyProfile::fixed(Duration::from_millis(30))).await;
    let dispatcher = RacingDispatcher::new(HttpCaller::new());

    let result = dispatcher.dispatch(&RaceConfig::tied(failing.as_str(), ok.as_str())).await.unwrap();

    assert_eq!(result, Some(hello("ok")));
}

#[tokio::test]
async fn aggregator_merges_three_services() {
    let a1 = spawn_backend("A", LatencyProfile::instant()).await;
    let a2 = spawn_backend("A2", LatencyProfile::fixed(Duration::from_secs(30))).await;
    let b1 = spawn_failing().await;
    let b2 = dead_address().await;
    let c1 = spawn_failing().await;
    let c2 = spawn_backend("C2", LatencyProfile::instant()).await;

    let settings = AggregatorSettings {
        port: 0,
        mode: RaceMode::Tied,
        hedge_after: Duration::from_millis(20),
        services: vec![
            ServicePair::new("A", a1, a2),
            ServicePair::new("B", b1, b2),
            ServicePair::new("C", c1, c2),
        ],
    };
    let app = aggregator::router(RacingDispatcher::new(HttpCaller::new()), &settings).unwrap();
    let url = spawn(app).await;

    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();

    assert_eq!(
        body,
        json!({
            "A": hello("A"),
            "B": "No Response from B",
            "C": hello("C2"),
        })
    );
}

#[tokio::test]
async fn aggregator_standard_mode_only_calls_primaries() {
    let a1 = spawn_backend("A", LatencyProfile::instant()).await;
    let b1 = spawn_backend("B", LatencyProfile::instant()).await;
    let c1 = spawn_failing().await;
    let unused = dead_address().await;

    let settings = AggregatorSettings {
        port: 0,
        mode: RaceMode::Standard,
        hedge_after: Duration::from_millis(20),
        services: vec![
            ServicePair::new("A", a1, unused.as_str()),
            ServicePair::new("B", b1, unused.as_str()),
            ServicePair::new("C", c1, unused.as_str()),
        ],
    };
    let dispatcher = RacingDispatcher::new(HttpCaller::new());
    let app = aggregator::router(dispatcher.clone(), &settings).unwrap();
    let url = spawn(app).await;

    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();

    assert_eq!(body["A"], hello("A"));
    assert_eq!(body["B"], hello("B"));
    assert_eq!(body["C"], json!("No Response from C"));
    assert!(!dispatcher.endpoint_stats().contains_key(&Endpoint::new(unused)));
}

#[tokio::test]
async fn aggregator_reports_null_payload_as_no_response() {
    let a1 = spawn_null().await;
    let a2 = dead_address().await;
    let b1 = spawn_backend("B", LatencyProfile::instant()).await;

    let settings = AggregatorSettings {
        port: 0,
        mode: RaceMode::Standard,
        hedge_after: Duration::from_millis(20),
        services: vec![
            ServicePair::new("A", a1.as_str(), a2.as_str()),
            ServicePair::new("B", b1, a2.as_str()),
        ],
    };
    let dispatcher = RacingDispatcher::new(HttpCaller::new());
    let app = aggregator::router(dispatcher.clone(), &settings).unwrap();
    let url = spawn(app).await;

    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();

    assert_eq!(body, json!({ "A": "No Response from A", "B": hello("B") }));
    // The null answer still counts as a successful call.
    assert_eq!(dispatcher.endpoint_stats()[&Endpoint::new(a1)].wins, 1);
}

#[tokio::test]
async fn backend_run_reports_bind_failure() {
    let taken = TcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();

    let settings = backend::BackendSettings {
        port,
        ..backend::BackendSettings::default()
    };
    let err = backend::run(settings).await.unwrap_err();

    assert!(matches!(err, ServeError::Io(_)), "{err:?}");
}
