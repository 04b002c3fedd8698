//! mcp-bridge — expose a Model Context Protocol server as workflow operations.
//!
//! The bridge spawns an MCP server as a subprocess, speaks JSON-RPC 2.0 to it
//! over stdio, and maps six host-level operations (list/read resources, list
//! and execute tools, list/get prompts) onto single request/response
//! exchanges. Discovered tool schemas are translated into typed parameter
//! validators and callable wrappers for agent tool-calling frameworks.
//!
//! Everything is per-invocation: one subprocess, one session, one operation,
//! one output record. There is no pooling, no reconnect state, no cache.

pub mod credentials;
pub mod dispatch;
pub mod errors;
pub mod schema;
pub mod session;
pub mod tool;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use credentials::{ConnectionConfig, Credentials, ENV_PREFIX};
pub use dispatch::{dispatch, Operation, OperationRequest, OperationResult};
pub use errors::BridgeError;
pub use schema::{ItemKind, ParamKind, ParamSpec, ParameterSchema};
pub use session::{McpSession, StdioSession, Timeouts};
pub use tool::{build_callable_tools, CallableTool};
pub use types::ToolDescriptor;

use std::sync::Arc;

/// Run one complete invocation: validate the request, bootstrap a session,
/// dispatch the operation, and tear the subprocess down.
///
/// This is the top-level boundary where every failure surfaces as a single
/// `BridgeError` — no partial results. `process_env` is a snapshot of the
/// host environment (`std::env::vars()` in production).
pub async fn execute(
    credentials: &Credentials,
    process_env: impl IntoIterator<Item = (String, String)>,
    request: &OperationRequest,
    timeouts: Timeouts,
) -> Result<OperationResult, BridgeError> {
    // Validate before spawning anything: a bad operation key or missing
    // parameter should not cost a subprocess launch.
    let operation = Operation::from_request(request)?;
    let config = ConnectionConfig::from_credentials(credentials, process_env)?;

    let session = Arc::new(StdioSession::connect(&config, timeouts).await?);
    let handle: Arc<dyn McpSession> = session.clone();

    let result = dispatch(&handle, operation).await;
    session.close().await;
    result
}
