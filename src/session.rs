//! Session bootstrapping and the live MCP session.
//!
//! Spawns the server subprocess from a `ConnectionConfig`, runs the MCP
//! `initialize` handshake, and exposes the protocol's request surface behind
//! the `McpSession` trait. One session serves exactly one top-level
//! invocation — there is no pooling, reconnection, or health checking; the
//! child is killed when the session is dropped.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::credentials::ConnectionConfig;
use crate::errors::BridgeError;
use crate::transport::{self, StdioTransport};
use crate::types::{
    ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, ServerInfo,
    ToolDescriptor, ToolsListResult,
};

/// MCP protocol version advertised during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Default timeout for the connect + initialize handshake.
///
/// Generous because some servers import heavyweight runtimes at startup.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for each session call.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

// ─── Timeouts ────────────────────────────────────────────────────────────────

/// Configurable bounds on the handshake and on each session call.
///
/// The subprocess dependency is inherently a hang risk; every exchange is
/// bounded by one of these.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    pub call: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            call: DEFAULT_CALL_TIMEOUT,
        }
    }
}

// ─── McpSession ──────────────────────────────────────────────────────────────

/// The request surface of a connected MCP session.
///
/// Object-safe so the dispatcher and the callable-tool wrappers can be
/// exercised against a mock in tests.
#[async_trait]
pub trait McpSession: Send + Sync {
    async fn list_resources(&self) -> Result<serde_json::Value, BridgeError>;
    async fn read_resource(&self, uri: &str) -> Result<serde_json::Value, BridgeError>;
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError>;
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, BridgeError>;
    async fn list_prompts(&self) -> Result<serde_json::Value, BridgeError>;
    async fn get_prompt(&self, name: &str) -> Result<serde_json::Value, BridgeError>;
}

// ─── StdioSession ────────────────────────────────────────────────────────────

/// A live session against a server subprocess over stdio.
pub struct StdioSession {
    /// Label for error context (the launched command).
    peer: String,
    transport: StdioTransport,
    process: Mutex<Child>,
    call_timeout: Duration,
    /// Server identification from the initialize response, when provided.
    pub server_info: Option<ServerInfo>,
}

impl std::fmt::Debug for StdioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioSession")
            .field("peer", &self.peer)
            .field("call_timeout", &self.call_timeout)
            .field("server_info", &self.server_info)
            .finish_non_exhaustive()
    }
}

impl StdioSession {
    /// Spawn the server subprocess and perform the initialize handshake.
    ///
    /// Fails with `BridgeError::Connection` if the process cannot be spawned
    /// or the handshake does not complete within `timeouts.connect`. On
    /// handshake failure any captured stderr is appended to the error.
    pub async fn connect(
        config: &ConnectionConfig,
        timeouts: Timeouts,
    ) -> Result<Self, BridgeError> {
        tracing::debug!(
            command = %config.command,
            args = ?config.args,
            env_keys = config.env.len(),
            "spawning MCP server subprocess"
        );

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        // Windows: prevent a console window from appearing for the child.
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        // The session lifetime is one invocation; reap the child if the
        // session is dropped without an explicit close.
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| BridgeError::Connection {
            reason: format!("failed to spawn '{}': {e}", config.command),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| BridgeError::Connection {
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| BridgeError::Connection {
            reason: "failed to capture stdout".into(),
        })?;
        let stderr_handle = child.stderr.take();

        let transport = StdioTransport::new(&config.command, stdin, stdout);

        let server_info =
            match tokio::time::timeout(timeouts.connect, initialize(&transport)).await {
                Ok(Ok(info)) => info,
                Ok(Err(e)) => {
                    let _ = child.kill().await;
                    return Err(connection_failure(
                        e.to_string(),
                        stderr_excerpt(stderr_handle).await,
                    ));
                }
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(connection_failure(
                        format!(
                            "initialize handshake timed out after {}ms",
                            timeouts.connect.as_millis()
                        ),
                        stderr_excerpt(stderr_handle).await,
                    ));
                }
            };

        if let Some(info) = &server_info {
            tracing::debug!(
                server = info.name.as_deref().unwrap_or("unknown"),
                version = info.version.as_deref().unwrap_or("unknown"),
                "MCP session established"
            );
        }

        Ok(Self {
            peer: config.command.clone(),
            transport,
            process: Mutex::new(child),
            call_timeout: timeouts.call,
            server_info,
        })
    }

    /// One bounded request/response exchange.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, BridgeError> {
        let response = tokio::time::timeout(
            self.call_timeout,
            self.transport.request(method, params),
        )
        .await
        .map_err(|_| BridgeError::Timeout {
            what: method.to_string(),
            timeout_ms: self.call_timeout.as_millis() as u64,
        })??;

        transport::extract_result(response)
    }

    /// Tear the subprocess down eagerly (cancellation path).
    ///
    /// Dropping the session also kills the child; this just makes teardown
    /// deterministic when the host cancels mid-invocation.
    pub async fn close(&self) {
        let mut process = self.process.lock().await;
        let _ = process.kill().await;
    }
}

#[async_trait]
impl McpSession for StdioSession {
    async fn list_resources(&self) -> Result<serde_json::Value, BridgeError> {
        self.request("resources/list", None).await
    }

    async fn read_resource(&self, uri: &str) -> Result<serde_json::Value, BridgeError> {
        self.request("resources/read", Some(serde_json::json!({ "uri": uri })))
            .await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        let result = self.request("tools/list", None).await?;
        let list: ToolsListResult =
            serde_json::from_value(result).map_err(|e| BridgeError::Transport {
                peer: self.peer.clone(),
                reason: format!("failed to parse tools/list response: {e}"),
            })?;
        Ok(list.tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, BridgeError> {
        self.request(
            "tools/call",
            Some(serde_json::json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    async fn list_prompts(&self) -> Result<serde_json::Value, BridgeError> {
        self.request("prompts/list", None).await
    }

    async fn get_prompt(&self, name: &str) -> Result<serde_json::Value, BridgeError> {
        self.request("prompts/get", Some(serde_json::json!({ "name": name })))
            .await
    }
}

// ─── Handshake ───────────────────────────────────────────────────────────────

/// Perform the MCP `initialize` handshake and send the `initialized`
/// notification the protocol requires.
async fn initialize(transport: &StdioTransport) -> Result<Option<ServerInfo>, BridgeError> {
    let params = InitializeParams {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: ClientCapabilities::default(),
        client_info: ClientInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };

    let params_value =
        serde_json::to_value(&params).map_err(|e| BridgeError::Connection {
            reason: format!("failed to encode initialize params: {e}"),
        })?;

    let response = transport.request("initialize", Some(params_value)).await?;
    let result = transport::extract_result(response)?;

    let init: InitializeResult =
        serde_json::from_value(result).map_err(|e| BridgeError::Connection {
            reason: format!("failed to parse initialize response: {e}"),
        })?;

    transport.notify("notifications/initialized", None).await?;

    Ok(init.server_info)
}

/// How long to wait for a failed child's stderr before giving up on it.
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// Cap on the stderr excerpt folded into a connection error.
const STDERR_EXCERPT_CHARS: usize = 2000;

/// Build the `Connection` error for a failed handshake, folding in whatever
/// the child wrote to stderr.
fn connection_failure(reason: String, stderr: Option<String>) -> BridgeError {
    let Some(stderr) = stderr else {
        return BridgeError::Connection { reason };
    };
    tracing::warn!(%stderr, "server stderr captured on handshake failure");
    BridgeError::Connection {
        reason: format!("{reason} | stderr: {stderr}"),
    }
}

/// Drain what the child wrote to stderr, trimmed and capped. `None` when the
/// pipe was not captured, stays silent, or never closes within the grace
/// period.
async fn stderr_excerpt(stderr_handle: Option<tokio::process::ChildStderr>) -> Option<String> {
    use tokio::io::AsyncReadExt;

    let mut stderr = stderr_handle?;
    let mut buf = String::new();
    match tokio::time::timeout(STDERR_GRACE, stderr.read_to_string(&mut buf)).await {
        Ok(Ok(_)) => {}
        _ => return None,
    }

    let trimmed = buf.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut excerpt: String = trimmed.chars().take(STDERR_EXCERPT_CHARS).collect();
    if excerpt.len() < trimmed.len() {
        excerpt.push_str("...(truncated)");
    }
    Some(excerpt)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
