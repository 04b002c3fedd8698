//! JSON-RPC over stdio transport.
//!
//! Line-delimited JSON-RPC 2.0 against a server subprocess: one request per
//! line on stdin, responses read line-by-line from stdout. Lines that are
//! not protocol messages (server log noise) are skipped. Generic over the
//! byte streams so tests can drive the protocol over in-memory pipes.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use crate::errors::BridgeError;
use crate::types::{error_codes, JsonRpcRequest, JsonRpcResponse};

/// Monotonic request ID counter, shared across sessions.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC client over a writer/reader stream pair.
///
/// The exchange is strictly sequential: one outstanding request at a time,
/// matched to its response by id.
pub struct Transport<R, W> {
    /// Label for error context (the launched command).
    peer: String,
    writer: Mutex<W>,
    reader: Mutex<BufReader<R>>,
}

/// The production transport: a child process's stdio.
pub type StdioTransport = Transport<ChildStdout, ChildStdin>;

impl<R, W> Transport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Create a transport writing requests to `stdin` and reading responses
    /// from `stdout`.
    pub fn new(peer: &str, stdin: W, stdout: R) -> Self {
        Self {
            peer: peer.to_string(),
            writer: Mutex::new(stdin),
            reader: Mutex::new(BufReader::new(stdout)),
        }
    }

    /// Send a request and wait for the response carrying the same id.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, BridgeError> {
        let id = next_request_id();
        let line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))
            .map_err(|e| self.error(format!("failed to serialize request: {e}")))?;

        self.send_line(line).await?;
        self.read_response(id).await
    }

    /// Send a notification: no id, no response expected. The `params` key is
    /// omitted entirely when there are none.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), BridgeError> {
        let mut body = serde_json::Map::new();
        body.insert("jsonrpc".into(), "2.0".into());
        body.insert("method".into(), method.into());
        if let Some(params) = params {
            body.insert("params".into(), params);
        }

        self.send_line(serde_json::Value::Object(body).to_string())
            .await
    }

    /// Write one newline-terminated frame and flush it.
    async fn send_line(&self, mut line: String) -> Result<(), BridgeError> {
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.error(format!("failed to write to stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.error(format!("failed to flush stdin: {e}")))
    }

    /// Read lines until the response for `id` arrives.
    async fn read_response(&self, id: u64) -> Result<JsonRpcResponse, BridgeError> {
        let mut reader = self.reader.lock().await;
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader
                .read_line(&mut line)
                .await
                .map_err(|e| self.error(format!("failed to read from stdout: {e}")))?;

            if bytes_read == 0 {
                return Err(
                    self.error("stdout closed (process may have exited)".into())
                );
            }

            let frame = line.trim();
            if frame.is_empty() {
                continue;
            }

            let Ok(response) = serde_json::from_str::<JsonRpcResponse>(frame) else {
                // Not a protocol message; servers sometimes log to stdout.
                tracing::trace!(peer = %self.peer, line = frame, "skipping non-protocol output");
                continue;
            };

            if response.id == Some(id) {
                return Ok(response);
            }
            // Server-initiated messages and responses for other ids carry no
            // waiter in this sequential exchange; drop them.
        }
    }

    fn error(&self, reason: String) -> BridgeError {
        BridgeError::Transport {
            peer: self.peer.clone(),
            reason,
        }
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Unpack a JSON-RPC response into its result, converting error responses
/// (and the degenerate neither-result-nor-error case) to `BridgeError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, BridgeError> {
    match (response.result, response.error) {
        (_, Some(err)) => Err(BridgeError::Server {
            code: err.code,
            message: err.message,
            data: err.data,
        }),
        (Some(result), None) => Ok(result),
        (None, None) => Err(BridgeError::Server {
            code: error_codes::INTERNAL_ERROR,
            message: "response carried neither result nor error".into(),
            data: None,
        }),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
