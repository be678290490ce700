//! Scripted transport for tests.
//!
//! Lives in the library (not behind `cfg(test)`) so downstream crates can
//! drive a real [`crate::client::McpClient`] against canned responses in
//! their own test suites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::Transport;
use crate::error::McpError;
use crate::protocol::RpcErrorBody;

/// A request or notification recorded by the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Method name
    pub method: String,
    /// Parameters as sent
    pub params: Option<Value>,
}

/// Mock implementation of [`Transport`] with configurable behavior.
///
/// Responses are keyed by method; an injected JSON-RPC error takes precedence
/// over any configured response. An optional per-request delay together with
/// an optional timeout emulates a slow server under a deadline.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, Value>>,
    rpc_error: Mutex<Option<RpcErrorBody>>,
    delay: Mutex<Option<Duration>>,
    timeout_ms: Mutex<Option<u64>>,
    cancel: CancellationToken,

    started: AtomicBool,
    closed: AtomicBool,

    requests: Mutex<Vec<RecordedCall>>,
    notifications: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    /// Create a mock with no scripted behavior: every request succeeds with
    /// an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an ambient cancellation token, honored while delaying.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Configure the result returned for a method.
    pub async fn set_response(&self, method: &str, result: Value) {
        self.responses.lock().await.insert(method.to_string(), result);
    }

    /// Script a plausible `initialize` result.
    pub async fn script_initialize(&self, server_name: &str) {
        self.set_response(
            "initialize",
            json!({
                "protocolVersion": "2025-03-26",
                "capabilities": { "tools": {} },
                "serverInfo": { "name": server_name, "version": "1.0.0" }
            }),
        )
        .await;
    }

    /// Make every request fail with the given JSON-RPC error.
    pub async fn set_rpc_error(&self, code: i64, message: &str) {
        *self.rpc_error.lock().await = Some(RpcErrorBody {
            code,
            message: message.to_string(),
            data: None,
        });
    }

    /// Shorthand for the server-defined tool-not-found error.
    pub async fn set_tool_not_found(&self) {
        self.set_rpc_error(-32000, "Tool not found").await;
    }

    /// Clear a previously injected error.
    pub async fn clear_rpc_error(&self) {
        *self.rpc_error.lock().await = None;
    }

    /// Delay every response by the given duration.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }

    /// Apply a per-request deadline, as a real transport would.
    pub async fn set_timeout_ms(&self, timeout_ms: u64) {
        *self.timeout_ms.lock().await = Some(timeout_ms);
    }

    /// Requests recorded so far.
    pub async fn requests(&self) -> Vec<RecordedCall> {
        self.requests.lock().await.clone()
    }

    /// Notifications recorded so far.
    pub async fn notifications(&self) -> Vec<RecordedCall> {
        self.notifications.lock().await.clone()
    }

    /// Number of requests for one method.
    pub async fn request_count(&self, method: &str) -> usize {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    /// Whether `start` was called.
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start(&self) -> Result<(), McpError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        self.requests.lock().await.push(RecordedCall {
            method: method.to_string(),
            params,
        });

        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            let deadline = *self.timeout_ms.lock().await;
            let sleep = tokio::time::sleep(delay);

            match deadline {
                Some(ms) => {
                    tokio::select! {
                        () = self.cancel.cancelled() => return Err(McpError::Cancelled),
                        result = tokio::time::timeout(Duration::from_millis(ms), sleep) => {
                            if result.is_err() {
                                return Err(McpError::Timeout(ms));
                            }
                        }
                    }
                }
                None => {
                    tokio::select! {
                        () = self.cancel.cancelled() => return Err(McpError::Cancelled),
                        () = sleep => {}
                    }
                }
            }
        }

        if let Some(error) = self.rpc_error.lock().await.clone() {
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        let response = self
            .responses
            .lock()
            .await
            .get(method)
            .cloned()
            .unwrap_or_else(|| json!({}));

        Ok(response)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.notifications.lock().await.push(RecordedCall {
            method: method.to_string(),
            params,
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
