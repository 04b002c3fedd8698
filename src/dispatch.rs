//! Operation dispatch.
//!
//! Maps a validated host operation onto a single request/response exchange
//! over the session and wraps the outcome as exactly one `OperationResult`.
//! No retries, no streaming, no fan-out: either the one result is produced
//! or the invocation fails.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::BridgeError;
use crate::session::McpSession;
use crate::tool::build_callable_tools;

// ─── OperationRequest ────────────────────────────────────────────────────────

/// Raw host input: an operation key plus the per-operation parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub operation: String,
    #[serde(default)]
    pub resource_uri: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Tool arguments as JSON text, parsed at dispatch time.
    #[serde(default)]
    pub tool_parameters: Option<String>,
    #[serde(default)]
    pub prompt_name: Option<String>,
}

// ─── Operation ───────────────────────────────────────────────────────────────

/// A validated operation with its parameters resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    ListResources,
    ReadResource { uri: String },
    ListTools,
    ExecuteTool { tool_name: String, tool_parameters: String },
    ListPrompts,
    GetPrompt { name: String },
}

impl Operation {
    /// Validate a raw request into an operation.
    ///
    /// Unknown operation keys fail with `UnsupportedOperation`; absent or
    /// empty required parameters fail with `MissingParameter`.
    pub fn from_request(request: &OperationRequest) -> Result<Self, BridgeError> {
        match request.operation.as_str() {
            "listResources" => Ok(Self::ListResources),
            "readResource" => Ok(Self::ReadResource {
                uri: required_param(request, request.resource_uri.as_deref(), "resourceUri")?,
            }),
            "listTools" => Ok(Self::ListTools),
            "executeTool" => Ok(Self::ExecuteTool {
                tool_name: required_param(request, request.tool_name.as_deref(), "toolName")?,
                tool_parameters: request
                    .tool_parameters
                    .clone()
                    .unwrap_or_else(|| "{}".to_string()),
            }),
            "listPrompts" => Ok(Self::ListPrompts),
            "getPrompt" => Ok(Self::GetPrompt {
                name: required_param(request, request.prompt_name.as_deref(), "promptName")?,
            }),
            other => Err(BridgeError::UnsupportedOperation {
                operation: other.to_string(),
            }),
        }
    }
}

fn required_param(
    request: &OperationRequest,
    value: Option<&str>,
    name: &str,
) -> Result<String, BridgeError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(BridgeError::MissingParameter {
            operation: request.operation.clone(),
            name: name.to_string(),
        }),
    }
}

// ─── OperationResult ─────────────────────────────────────────────────────────

/// The single output record of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult {
    pub json: Value,
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

/// Execute one operation against a connected session.
pub async fn dispatch(
    session: &Arc<dyn McpSession>,
    operation: Operation,
) -> Result<OperationResult, BridgeError> {
    tracing::debug!(operation = ?operation, "dispatching MCP operation");

    let json = match operation {
        Operation::ListResources => {
            let resources = session.list_resources().await?;
            json!({ "resources": resources })
        }

        Operation::ReadResource { uri } => {
            let resource = session.read_resource(&uri).await?;
            json!({ "resource": resource })
        }

        Operation::ListTools => {
            let descriptors = session.list_tools().await?;
            let tools = build_callable_tools(session, descriptors)?;
            // The callables themselves stay in-process for agent consumption;
            // the host record carries name, description, and parameter names.
            let listing: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name(),
                        "description": t.description(),
                        "schema": t.schema().param_names(),
                    })
                })
                .collect();
            json!({ "tools": listing })
        }

        Operation::ExecuteTool {
            tool_name,
            tool_parameters,
        } => {
            // Parse before touching the session: malformed JSON must not
            // cost a subprocess round-trip.
            let arguments: Value = serde_json::from_str(&tool_parameters).map_err(|e| {
                BridgeError::ParameterParse {
                    reason: e.to_string(),
                }
            })?;
            let result = session.call_tool(&tool_name, arguments).await?;
            json!({ "result": result })
        }

        Operation::ListPrompts => {
            let prompts = session.list_prompts().await?;
            json!({ "prompts": prompts })
        }

        Operation::GetPrompt { name } => {
            let prompt = session.get_prompt(&name).await?;
            json!({ "prompt": prompt })
        }
    };

    Ok(OperationResult { json })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolDescriptor;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted session: canned responses plus a record of `tools/call`
    /// invocations.
    #[derive(Default)]
    struct ScriptedSession {
        tools: Vec<ToolDescriptor>,
        call_result: Value,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedSession {
        fn into_session(self) -> Arc<dyn McpSession> {
            Arc::new(self)
        }
    }

    #[async_trait]
    impl McpSession for ScriptedSession {
        async fn list_resources(&self) -> Result<Value, BridgeError> {
            Ok(json!({"resources": [{"uri": "file:///a.txt"}]}))
        }
        async fn read_resource(&self, uri: &str) -> Result<Value, BridgeError> {
            Ok(json!({"contents": [{"uri": uri, "text": "body"}]}))
        }
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError> {
            Ok(self.tools.clone())
        }
        async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, BridgeError> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments));
            Ok(self.call_result.clone())
        }
        async fn list_prompts(&self) -> Result<Value, BridgeError> {
            Ok(json!({"prompts": [{"name": "greet"}]}))
        }
        async fn get_prompt(&self, name: &str) -> Result<Value, BridgeError> {
            Ok(json!({"name": name, "messages": []}))
        }
    }

    fn add_descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: "add".into(),
            description: None,
            input_schema: Some(json!({
                "properties": {
                    "a": {"type": "number"},
                    "b": {"type": "number"}
                },
                "required": ["a", "b"]
            })),
        }
    }

    fn request(operation: &str) -> OperationRequest {
        OperationRequest {
            operation: operation.to_string(),
            ..Default::default()
        }
    }

    // ─── Operation parsing ───────────────────────────────────────────

    #[test]
    fn test_unknown_operation_rejected() {
        let err = Operation::from_request(&request("flyToTheMoon")).unwrap_err();
        match err {
            BridgeError::UnsupportedOperation { operation } => {
                assert_eq!(operation, "flyToTheMoon");
            }
            other => panic!("expected UnsupportedOperation, got: {other:?}"),
        }
    }

    #[test]
    fn test_read_resource_requires_uri() {
        let mut req = request("readResource");
        assert!(matches!(
            Operation::from_request(&req).unwrap_err(),
            BridgeError::MissingParameter { .. }
        ));

        req.resource_uri = Some("  ".into());
        assert!(Operation::from_request(&req).is_err());

        req.resource_uri = Some("file:///a.txt".into());
        assert_eq!(
            Operation::from_request(&req).unwrap(),
            Operation::ReadResource {
                uri: "file:///a.txt".into()
            }
        );
    }

    #[test]
    fn test_get_prompt_requires_name() {
        let mut req = request("getPrompt");
        assert!(Operation::from_request(&req).is_err());

        req.prompt_name = Some("greet".into());
        assert_eq!(
            Operation::from_request(&req).unwrap(),
            Operation::GetPrompt {
                name: "greet".into()
            }
        );
    }

    #[test]
    fn test_execute_tool_defaults_parameters_to_empty_object() {
        let mut req = request("executeTool");
        req.tool_name = Some("add".into());
        assert_eq!(
            Operation::from_request(&req).unwrap(),
            Operation::ExecuteTool {
                tool_name: "add".into(),
                tool_parameters: "{}".into()
            }
        );
    }

    #[test]
    fn test_operation_request_deserializes_camel_case() {
        let req: OperationRequest = serde_json::from_str(
            r#"{"operation": "executeTool", "toolName": "add", "toolParameters": "{\"a\":1}"}"#,
        )
        .unwrap();
        assert_eq!(req.tool_name.as_deref(), Some("add"));
        assert_eq!(req.tool_parameters.as_deref(), Some("{\"a\":1}"));
    }

    // ─── Dispatch ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_list_resources_wraps_raw_result() {
        let session = ScriptedSession::default().into_session();
        let result = dispatch(&session, Operation::ListResources).await.unwrap();
        assert_eq!(
            result.json,
            json!({"resources": {"resources": [{"uri": "file:///a.txt"}]}})
        );
    }

    #[tokio::test]
    async fn test_read_resource_wraps_raw_result() {
        let session = ScriptedSession::default().into_session();
        let result = dispatch(
            &session,
            Operation::ReadResource {
                uri: "file:///a.txt".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(result.json["resource"]["contents"][0]["text"], "body");
    }

    #[tokio::test]
    async fn test_list_tools_returns_name_description_and_param_names() {
        let session = ScriptedSession {
            tools: vec![add_descriptor()],
            ..Default::default()
        }
        .into_session();

        let result = dispatch(&session, Operation::ListTools).await.unwrap();
        assert_eq!(
            result.json,
            json!({"tools": [{
                "name": "add",
                "description": "Execute the add tool",
                "schema": ["a", "b"]
            }]})
        );
    }

    #[tokio::test]
    async fn test_list_tools_zero_tools_fails_fast() {
        let session = ScriptedSession::default().into_session();
        let err = dispatch(&session, Operation::ListTools).await.unwrap_err();
        assert!(matches!(err, BridgeError::NoToolsFound));
    }

    #[tokio::test]
    async fn test_execute_tool_invokes_session_and_wraps_result() {
        let scripted = Arc::new(ScriptedSession {
            call_result: json!({"content": [{"type": "text", "text": "5"}]}),
            ..Default::default()
        });
        let session: Arc<dyn McpSession> = scripted.clone();

        let result = dispatch(
            &session,
            Operation::ExecuteTool {
                tool_name: "add".into(),
                tool_parameters: r#"{"a":2,"b":3}"#.into(),
            },
        )
        .await
        .unwrap();

        let calls = scripted.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "add");
        assert_eq!(calls[0].1, json!({"a": 2, "b": 3}));
        assert_eq!(
            result.json,
            json!({"result": {"content": [{"type": "text", "text": "5"}]}})
        );
    }

    #[tokio::test]
    async fn test_execute_tool_invalid_json_fails_before_session_call() {
        let scripted = Arc::new(ScriptedSession::default());
        let session: Arc<dyn McpSession> = scripted.clone();

        let err = dispatch(
            &session,
            Operation::ExecuteTool {
                tool_name: "add".into(),
                tool_parameters: "not json".into(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BridgeError::ParameterParse { .. }));
        assert!(scripted.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_prompts_wraps_raw_result() {
        let session = ScriptedSession::default().into_session();
        let result = dispatch(&session, Operation::ListPrompts).await.unwrap();
        assert_eq!(
            result.json,
            json!({"prompts": {"prompts": [{"name": "greet"}]}})
        );
    }

    #[tokio::test]
    async fn test_get_prompt_wraps_raw_result() {
        let session = ScriptedSession::default().into_session();
        let result = dispatch(
            &session,
            Operation::GetPrompt {
                name: "greet".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(result.json["prompt"]["name"], "greet");
    }
}
