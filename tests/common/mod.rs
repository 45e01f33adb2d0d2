#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use hedged_fetch::{CallError, Caller, Endpoint};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// What a scripted endpoint does when called.
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeeds with `{"message": <msg>}` after the delay.
    Succeed(Duration, &'static str),
    /// Fails with a 500 after the delay.
    Fail(Duration),
    /// Never completes on its own.
    Hang,
}

/// One call observed by [`ScriptedCaller`].
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub endpoint: Endpoint,
    pub at: tokio::time::Instant,
    pub cancel: CancellationToken,
}

/// Caller whose endpoints follow fixed scripts, recording every call.
#[derive(Clone, Default)]
pub struct ScriptedCaller {
    scripts: Arc<HashMap<Endpoint, Script>>,
    calls: Arc<Mutex<Vec<CallRecord>>>,
}

impl ScriptedCaller {
    pub fn new(scripts: &[(&str, Script)]) -> Self {
        Self {
            scripts: Arc::new(
                scripts
                    .iter()
                    .map(|(e, s)| (Endpoint::new(*e), s.clone()))
                    .collect(),
            ),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, endpoint: &str) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|c| c.endpoint.as_str() == endpoint)
            .collect()
    }

    /// Whether the token handed to the (single) call against `endpoint` was cancelled.
    pub fn was_cancelled(&self, endpoint: &str) -> bool {
        let calls = self.calls_to(endpoint);
        assert_eq!(calls.len(), 1, "expected exactly one call to {endpoint}");
        calls[0].cancel.is_cancelled()
    }
}

pub fn payload(msg: &str) -> Value {
    json!({ "message": msg })
}

#[async_trait]
impl Caller for ScriptedCaller {
    type Output = Value;

    async fn call(&self, endpoint: &Endpoint, cancel: CancellationToken) -> Result<Value, CallError> {
        self.calls.lock().unwrap().push(CallRecord {
            endpoint: endpoint.clone(),
            at: tokio::time::Instant::now(),
            cancel: cancel.clone(),
        });

        let script = self
            .scripts
            .get(endpoint)
            .cloned()
            .unwrap_or(Script::Fail(Duration::ZERO));

        let work = async move {
            match script {
                Script::Succeed(after, msg) => {
                    tokio::time::sleep(after).await;
                    Ok(payload(msg))
                }
                Script::Fail(after) => {
                    tokio::time::sleep(after).await;
                    Err(CallError::Status(500))
                }
                Script::Hang => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(CallError::Cancelled),
            res = work => res,
        }
    }
}
