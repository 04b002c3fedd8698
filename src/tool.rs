//! Callable tool wrappers.
//!
//! Each tool the server declares becomes a `CallableTool`: a validated,
//! uniformly-invokable wrapper suitable for handing to an agent tool-calling
//! framework. Wrappers are ephemeral — built per dispatch, never cached.

use std::sync::Arc;

use serde_json::Value;

use crate::errors::BridgeError;
use crate::schema::ParameterSchema;
use crate::session::McpSession;
use crate::types::ToolDescriptor;

// ─── CallableTool ────────────────────────────────────────────────────────────

/// One discovered tool, wrapped behind a typed parameter validator and a
/// uniform string-returning `invoke`.
pub struct CallableTool {
    name: String,
    description: String,
    schema: ParameterSchema,
    session: Arc<dyn McpSession>,
}

impl std::fmt::Debug for CallableTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl CallableTool {
    /// Build a wrapper from a server-declared descriptor.
    pub fn from_descriptor(descriptor: ToolDescriptor, session: Arc<dyn McpSession>) -> Self {
        let schema = ParameterSchema::from_input_schema(descriptor.input_schema.as_ref());
        let description = descriptor
            .description
            .unwrap_or_else(|| format!("Execute the {} tool", descriptor.name));

        Self {
            name: descriptor.name,
            description,
            schema,
            session,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The derived parameter schema.
    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    /// Validate `params` and execute the tool on the session.
    ///
    /// Structured results are JSON-encoded; plain strings pass through;
    /// other scalars are display-formatted. A session failure is re-labeled
    /// as `ToolExecution` carrying this tool's name — the raw underlying
    /// error never escapes unlabeled.
    pub async fn invoke(&self, params: Value) -> Result<String, BridgeError> {
        self.schema.validate(&self.name, &params)?;

        let result = self
            .session
            .call_tool(&self.name, params)
            .await
            .map_err(|e| BridgeError::ToolExecution {
                tool: self.name.clone(),
                message: e.to_string(),
            })?;

        Ok(stringify_result(result))
    }
}

/// Translate every discovered descriptor into a callable wrapper.
///
/// An empty catalog fails with `NoToolsFound`: downstream agent wiring
/// against a tool-less server is a configuration error, not a valid state.
pub fn build_callable_tools(
    session: &Arc<dyn McpSession>,
    descriptors: Vec<ToolDescriptor>,
) -> Result<Vec<CallableTool>, BridgeError> {
    if descriptors.is_empty() {
        return Err(BridgeError::NoToolsFound);
    }

    Ok(descriptors
        .into_iter()
        .map(|d| CallableTool::from_descriptor(d, Arc::clone(session)))
        .collect())
}

/// Generic stringification of a tool-call result.
///
/// Strings pass through unquoted; everything else is JSON-encoded (which for
/// scalars matches their display form). No special handling of binary or
/// deeply nested payloads.
fn stringify_result(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
