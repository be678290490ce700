//! Subprocess transport: newline-delimited JSON-RPC over a child's stdio.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Transport;
use crate::error::McpError;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// How long `close()` waits for the child to exit before killing it.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<JsonRpcResponse>>>>;

/// Transport that spawns the MCP server as a child process and exchanges one
/// JSON object per newline-terminated line on its stdio.
///
/// A single background task reads stdout and routes responses to waiters by
/// id; a second task drains stderr into the log so the server can never block
/// on a full pipe. Lines that fail to parse are skipped: the next frame may
/// be fine.
#[derive(Debug)]
pub struct StdioTransport {
    command: Vec<String>,
    timeout_ms: u64,
    cancel: CancellationToken,

    next_id: AtomicI64,
    pending: PendingMap,
    closed: Arc<AtomicBool>,

    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Create a stdio transport for the given command line.
    ///
    /// `command[0]` is the program, the rest its arguments. Nothing is
    /// spawned until [`Transport::start`].
    #[must_use]
    pub fn new(command: Vec<String>, timeout_ms: u64) -> Self {
        Self {
            command,
            timeout_ms,
            cancel: CancellationToken::new(),
            next_id: AtomicI64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
            stdin: Mutex::new(None),
            child: Mutex::new(None),
        }
    }

    /// Attach an ambient cancellation token.
    ///
    /// A cancelled token makes every pending and future request return
    /// [`McpError::Cancelled`] at its next suspension point.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn server_label(&self) -> &str {
        self.command.first().map_or("<unspawned>", String::as_str)
    }

    async fn write_line(&self, mut line: String) -> Result<(), McpError> {
        line.push('\n');

        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(McpError::Closed)?;
        stdin.write_all(line.as_bytes()).await.map_err(|_| McpError::Closed)?;
        stdin.flush().await.map_err(|_| McpError::Closed)?;
        Ok(())
    }

    /// Background stdout reader: routes responses to pending waiters.
    ///
    /// On EOF or read error every pending slot is dropped, which surfaces as
    /// [`McpError::Closed`] to the waiters.
    fn spawn_reader(&self, stdout: tokio::process::ChildStdout) {
        let pending = Arc::clone(&self.pending);
        let closed = Arc::clone(&self.closed);
        let server = self.server_label().to_string();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }

                let response = match serde_json::from_str::<JsonRpcResponse>(&line) {
                    Ok(resp) => resp,
                    Err(err) => {
                        warn!(server = %server, error = %err, "skipping unparseable frame");
                        continue;
                    }
                };

                let Some(id) = response.id else {
                    // Server-initiated notification; nothing waits on it.
                    continue;
                };

                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(response);
                } else {
                    debug!(server = %server, id, "late or unknown response id, dropping");
                }
            }

            closed.store(true, Ordering::SeqCst);
            // Dropping the senders wakes every remaining waiter with Closed.
            pending.lock().await.clear();
            debug!(server = %server, "stdout reader exited");
        });
    }

    /// Background stderr drain: the server's diagnostics go to our log with
    /// a server-identifying prefix and must never back-pressure the child.
    fn spawn_stderr_drain(&self, stderr: tokio::process::ChildStderr) {
        let server = self.server_label().to_string();

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(server = %server, "[server stderr] {line}");
            }
        });
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&self) -> Result<(), McpError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(McpError::Setup("command cannot be empty".to_string()));
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| McpError::Setup(format!("failed to spawn {program}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Setup("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Setup("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::Setup("failed to capture stderr".to_string()))?;

        self.spawn_reader(stdout);
        self.spawn_stderr_drain(stderr);

        *self.stdin.lock().await = Some(stdin);
        *self.child.lock().await = Some(child);

        debug!(server = %self.server_label(), "stdio transport started");
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = JsonRpcRequest::new(id, method, params);
        let line = serde_json::to_string(&request)?;

        if let Err(err) = self.write_line(line).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        let outcome = tokio::select! {
            () = self.cancel.cancelled() => Err(McpError::Cancelled),
            result = timeout(Duration::from_millis(self.timeout_ms), rx) => match result {
                Err(_) => Err(McpError::Timeout(self.timeout_ms)),
                Ok(Err(_)) => Err(McpError::Closed),
                Ok(Ok(response)) => Ok(response),
            },
        };

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                // Unregister so a late response is dropped, not misrouted.
                self.pending.lock().await.remove(&id);
                return Err(err);
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

        let note = JsonRpcNotification::new(method, params);
        self.write_line(serde_json::to_string(&note)?).await
    }

    async fn close(&self) -> Result<(), McpError> {
        self.closed.store(true, Ordering::SeqCst);

        // Dropping stdin signals EOF to the child.
        drop(self.stdin.lock().await.take());

        if let Some(mut child) = self.child.lock().await.take() {
            match timeout(CLOSE_GRACE, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(server = %self.server_label(), "child did not exit in time, killing");
                    let _ = child.kill().await;
                }
            }
        }

        self.pending.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_rejects_empty_command() {
        let transport = StdioTransport::new(vec![], 1_000);
        let err = transport.start().await.unwrap_err();
        assert!(matches!(err, McpError::Setup(_)));
    }

    #[tokio::test]
    async fn start_surfaces_spawn_failure() {
        let transport =
            StdioTransport::new(vec!["definitely-not-a-real-binary-xyz".to_string()], 1_000);
        let err = transport.start().await.unwrap_err();
        assert!(matches!(err, McpError::Setup(_)));
    }

    #[tokio::test]
    async fn request_after_close_is_terminal() {
        let transport = StdioTransport::new(vec!["cat".to_string()], 1_000);
        transport.close().await.unwrap();

        let err = transport.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::Closed));
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let transport = StdioTransport::new(vec!["cat".to_string()], 1_000);
        let a = transport.next_id.fetch_add(1, Ordering::SeqCst);
        let b = transport.next_id.fetch_add(1, Ordering::SeqCst);
        assert!(b > a);
    }
}
