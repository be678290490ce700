//! Streamable HTTP transport.
//!
//! Each JSON-RPC request is POSTed to the server's endpoint with the
//! descriptor's headers applied verbatim. The server answers either with a
//! plain JSON body or with a server-sent event stream carrying JSON-RPC
//! frames; both are handled behind the same [`Transport`] contract as stdio.
//! The session id handed out during `initialize` is echoed on every
//! subsequent exchange.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Transport;
use crate::error::McpError;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

const SESSION_HEADER: &str = "mcp-session-id";

/// Transport for MCP servers reachable over streamable HTTP.
#[derive(Debug)]
pub struct HttpTransport {
    url: String,
    headers: HashMap<String, String>,
    timeout_ms: u64,
    cancel: CancellationToken,

    next_id: AtomicI64,
    closed: AtomicBool,
    http: Mutex<Option<reqwest::Client>>,
    session_id: Mutex<Option<String>>,
}

impl HttpTransport {
    /// Create a streamable HTTP transport for the given endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>, headers: HashMap<String, String>, timeout_ms: u64) -> Self {
        Self {
            url: url.into(),
            headers,
            timeout_ms,
            cancel: CancellationToken::new(),
            next_id: AtomicI64::new(1),
            closed: AtomicBool::new(false),
            http: Mutex::new(None),
            session_id: Mutex::new(None),
        }
    }

    /// Attach an ambient cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn build_headers(&self) -> Result<HeaderMap, McpError> {
        let mut map = HeaderMap::new();
        // Streamable HTTP servers negotiate the response shape via Accept.
        map.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (key, value) in &self.headers {
            let name = HeaderName::from_str(key)
                .map_err(|e| McpError::Setup(format!("invalid header name {key}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| McpError::Setup(format!("invalid header value for {key}: {e}")))?;
            map.insert(name, value);
        }

        Ok(map)
    }

    async fn post(&self, body: String) -> Result<reqwest::Response, McpError> {
        let client = self
            .http
            .lock()
            .await
            .clone()
            .ok_or_else(|| McpError::Setup("transport not started".to_string()))?;

        let mut request = client.post(&self.url).body(body);
        if let Some(session) = self.session_id.lock().await.as_deref() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(McpError::Protocol(format!(
                "server returned HTTP {}",
                response.status()
            )));
        }
        Ok(response)
    }

    /// Read the response body until the frame with `id` arrives.
    ///
    /// A JSON body is decoded directly; an SSE body is scanned event by
    /// event, skipping frames for other ids and unparseable payloads.
    async fn read_response(
        &self,
        response: reqwest::Response,
        id: i64,
    ) -> Result<JsonRpcResponse, McpError> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().await = Some(session.to_string());
        }

        if !content_type.starts_with("text/event-stream") {
            let body = response.text().await?;
            return serde_json::from_str::<JsonRpcResponse>(&body)
                .map_err(|e| McpError::Protocol(format!("invalid JSON-RPC body: {e}")));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut data = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim_end_matches('\r').to_string();
                buffer.drain(..=pos);

                if let Some(payload) = line.strip_prefix("data:") {
                    if !data.is_empty() {
                        data.push('\n');
                    }
                    data.push_str(payload.trim_start());
                    continue;
                }

                // Blank line terminates the event.
                if line.is_empty() && !data.is_empty() {
                    let event = std::mem::take(&mut data);
                    match serde_json::from_str::<JsonRpcResponse>(&event) {
                        Ok(frame) if frame.id == Some(id) => return Ok(frame),
                        Ok(_) => {}
                        Err(err) => {
                            warn!(url = %self.url, error = %err, "skipping unparseable SSE frame");
                        }
                    }
                }
            }
        }

        Err(McpError::Closed)
    }

    async fn exchange(&self, id: i64, body: String) -> Result<JsonRpcResponse, McpError> {
        let response = self.post(body).await?;
        self.read_response(response, id).await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(&self) -> Result<(), McpError> {
        let headers = self.build_headers()?;
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| McpError::Setup(format!("failed to build HTTP client: {e}")))?;

        *self.http.lock().await = Some(client);
        debug!(url = %self.url, "streamable HTTP transport started");
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let response = tokio::select! {
            () = self.cancel.cancelled() => return Err(McpError::Cancelled),
            result = timeout(Duration::from_millis(self.timeout_ms), self.exchange(id, body)) => {
                match result {
                    Err(_) => return Err(McpError::Timeout(self.timeout_ms)),
                    Ok(outcome) => outcome?,
                }
            }
        };

        if let Some(error) = response.error {
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        response
            .result
            .ok_or_else(|| McpError::Protocol("response carries neither result nor error".to_string()))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::Closed);
        }

        let body = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        // Servers acknowledge notifications with 200/202 and an empty body.
        let _ = self.post(body).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        self.closed.store(true, Ordering::SeqCst);
        *self.http.lock().await = None;
        *self.session_id.lock().await = None;
        Ok(())
    }
}
