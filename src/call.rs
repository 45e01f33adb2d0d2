//! The cancellable call primitive the dispatcher races.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{config::Endpoint, errors::CallError};

/// Issues one call against one endpoint.
///
/// Implementations must stop work and return [`CallError::Cancelled`] once
/// `cancel` fires. The dispatcher also drops a losing call's future after
/// cancelling it, so implementations must tolerate never being polled again.
#[async_trait]
pub trait Caller: Send + Sync {
    /// Decoded payload of a successful call.
    type Output: Send;

    async fn call(
        &self,
        endpoint: &Endpoint,
        cancel: CancellationToken,
    ) -> Result<Self::Output, CallError>;
}

/// Fetch-by-URL over HTTP GET, decoding the body as JSON.
///
/// Any 2xx response is a success; every other status is a failure.
#[derive(Debug, Clone)]
pub struct HttpCaller {
    http: reqwest::Client,
}

impl HttpCaller {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, endpoint: &Endpoint) -> Result<Value, CallError> {
        let resp = self.http.get(endpoint.as_str()).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CallError::Status(status.as_u16()));
        }

        Ok(resp.json::<Value>().await?)
    }
}

impl Default for HttpCaller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Caller for HttpCaller {
    type Output = Value;

    async fn call(&self, endpoint: &Endpoint, cancel: CancellationToken) -> Result<Value, CallError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CallError::Cancelled),
            res = self.fetch(endpoint) => res,
        }
    }
}
