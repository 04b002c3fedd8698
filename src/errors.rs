//! Bridge error types.

use thiserror::Error;

/// Errors surfaced by the bridge.
///
/// Everything is caught at the top-level dispatch boundary and re-surfaced as
/// a single operational failure — no partial results, no automatic retries.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The server subprocess could not be spawned, or the MCP initialize
    /// handshake did not complete.
    #[error("failed to connect to MCP server: {reason}")]
    Connection {
        reason: String,
    },

    /// JSON-RPC communication error (malformed message, I/O error, closed
    /// stdio).
    #[error("transport error for '{peer}': {reason}")]
    Transport {
        peer: String,
        reason: String,
    },

    /// The server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    Server {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The tool-parameters payload was not valid JSON.
    #[error("failed to parse tool parameters: {reason}")]
    ParameterParse {
        reason: String,
    },

    /// The requested operation key is not one the bridge supports.
    #[error("operation '{operation}' not supported")]
    UnsupportedOperation {
        operation: String,
    },

    /// A required operation parameter was absent or empty.
    #[error("operation '{operation}' requires parameter '{name}'")]
    MissingParameter {
        operation: String,
        name: String,
    },

    /// The server declared zero tools during discovery.
    ///
    /// Deliberate fail-fast for downstream agent wiring — an empty tool
    /// surface is a misconfiguration, not a valid catalog.
    #[error("no tools found from MCP server")]
    NoToolsFound,

    /// A specific tool invocation failed.
    #[error("failed to execute '{tool}': {message}")]
    ToolExecution {
        tool: String,
        message: String,
    },

    /// Arguments failed the validator derived from the tool's input schema.
    #[error("invalid arguments for '{tool}': {reason}")]
    Validation {
        tool: String,
        reason: String,
    },

    /// A session call exceeded the configured timeout.
    #[error("'{what}' timed out after {timeout_ms}ms")]
    Timeout {
        what: String,
        timeout_ms: u64,
    },
}
