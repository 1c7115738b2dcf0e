//! Request handlers: the business logic invoked once per decoded frame.
//!
//! The server treats a handler as a black box that turns a request body into a
//! response body, possibly after suspending. A failing handler costs exactly one
//! response; the connection and the other in-flight requests are unaffected.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::HandlerConfig;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid request body: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Failed(String),
}

pub trait RequestHandler: Send + Sync + 'static {
    fn handle(
        &self,
        request_id: u32,
        body: Bytes,
    ) -> impl Future<Output = Result<Bytes, HandlerError>> + Send;
}

// ========================================
// CLOSURE HANDLER
// ========================================

pub struct HandlerFn<F>(F);

/// Wraps an async closure `(request_id, body) -> Result<Bytes, HandlerError>`.
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(u32, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, HandlerError>> + Send + 'static,
{
    HandlerFn(f)
}

impl<F, Fut> RequestHandler for HandlerFn<F>
where
    F: Fn(u32, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, HandlerError>> + Send + 'static,
{
    fn handle(
        &self,
        request_id: u32,
        body: Bytes,
    ) -> impl Future<Output = Result<Bytes, HandlerError>> + Send {
        (self.0)(request_id, body)
    }
}

// ========================================
// ECHO HANDLER
// ========================================

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl RequestHandler for EchoHandler {
    fn handle(
        &self,
        _request_id: u32,
        body: Bytes,
    ) -> impl Future<Output = Result<Bytes, HandlerError>> + Send {
        async move { Ok(body) }
    }
}

// ========================================
// SLEEP HANDLER (default server logic)
// ========================================

/// Request body: `{"sleep": <seconds>}`. A missing field or empty body means no delay.
#[derive(Debug, Default, Deserialize)]
struct SleepRequest {
    #[serde(default)]
    sleep: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepResponse {
    pub request_id: u32,
    pub status: String,
    pub slept: f64,
}

pub const STATUS_COMPLETED: &str = "completed";

/// Simulates work by sleeping for the requested number of seconds, then reports back.
#[derive(Debug, Clone)]
pub struct SleepHandler {
    max_sleep: Duration,
}

impl SleepHandler {
    pub fn new(max_sleep: Duration) -> Self {
        Self { max_sleep }
    }

    pub fn from_config(config: &HandlerConfig) -> Self {
        Self::new(Duration::from_millis(config.max_sleep_ms))
    }

    fn parse(body: &[u8]) -> Result<SleepRequest, HandlerError> {
        if body.is_empty() {
            return Ok(SleepRequest::default());
        }

        let request: SleepRequest = serde_json::from_slice(body)
            .map_err(|e| HandlerError::InvalidRequest(e.to_string()))?;

        if !request.sleep.is_finite() || request.sleep < 0.0 {
            return Err(HandlerError::InvalidRequest(format!(
                "sleep must be a non-negative number of seconds, got {}",
                request.sleep
            )));
        }
        Ok(request)
    }
}

impl Default for SleepHandler {
    fn default() -> Self {
        Self::from_config(&HandlerConfig::default())
    }
}

impl RequestHandler for SleepHandler {
    fn handle(
        &self,
        request_id: u32,
        body: Bytes,
    ) -> impl Future<Output = Result<Bytes, HandlerError>> + Send {
        let max_sleep = self.max_sleep;

        async move {
            let request = Self::parse(&body)?;

            // Clamp in f64 first: huge finite values do not fit in a Duration.
            let max_secs = max_sleep.as_secs_f64();
            let (delay, slept) = if request.sleep >= max_secs {
                (max_sleep, max_secs)
            } else {
                (Duration::from_secs_f64(request.sleep), request.sleep)
            };

            tokio::time::sleep(delay).await;

            let response = SleepResponse {
                request_id,
                status: STATUS_COMPLETED.to_string(),
                slept,
            };
            serde_json::to_vec(&response)
                .map(Bytes::from)
                .map_err(|e| HandlerError::Failed(e.to_string()))
        }
    }
}
