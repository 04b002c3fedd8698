//! Tool-schema translation.
//!
//! Converts a server-declared tool input schema (a JSON-Schema-like
//! descriptor, treated as untrusted input) into a typed parameter validator.
//! The descriptor's open-ended `type` tags are mapped onto a closed set of
//! variants with an explicit `Any` fallback, so the unconstrained case is
//! visible rather than an accident of dynamic dispatch.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::errors::BridgeError;

// ─── Derived Types ──────────────────────────────────────────────────────────

/// Element type of an array parameter, from `items.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    String,
    Number,
    Boolean,
    /// `items.type` absent or unrecognized.
    Any,
}

/// Validated primitive type derived from a property descriptor's `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    /// Any real number.
    Number,
    /// A number constrained to integral values.
    Integer,
    Boolean,
    Array(ItemKind),
    /// Open mapping of string → any.
    Object,
    /// Unrecognized `type` tag — accepts anything.
    Any,
}

impl ParamKind {
    fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array(_) => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

/// One parameter's derived type, documentation, and requiredness.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub kind: ParamKind,
    /// Human description from the descriptor. Documentary only, not enforced.
    pub description: Option<String>,
    pub required: bool,
}

// ─── ParameterSchema ────────────────────────────────────────────────────────

/// Composed parameter-object validator for one tool, keyed by property name.
///
/// A `BTreeMap` keeps the parameter listing deterministic for callers that
/// surface it (the `listTools` output and agent tool descriptions).
#[derive(Debug, Clone, Default)]
pub struct ParameterSchema {
    params: BTreeMap<String, ParamSpec>,
}

impl ParameterSchema {
    /// Derive a validator from a tool's declared `inputSchema`.
    ///
    /// A missing schema, or a schema without `properties`, yields a validator
    /// that accepts an empty parameter object only.
    pub fn from_input_schema(input_schema: Option<&Value>) -> Self {
        let Some(properties) = input_schema
            .and_then(|s| s.get("properties"))
            .and_then(Value::as_object)
        else {
            return Self::default();
        };

        let required: Vec<&str> = input_schema
            .and_then(|s| s.get("required"))
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let params = properties
            .iter()
            .map(|(key, prop)| {
                let spec = ParamSpec {
                    kind: derive_kind(prop),
                    description: prop
                        .get("description")
                        .and_then(Value::as_str)
                        .map(String::from),
                    required: required.contains(&key.as_str()),
                };
                (key.clone(), spec)
            })
            .collect();

        Self { params }
    }

    /// Parameter names in deterministic (sorted) order.
    pub fn param_names(&self) -> Vec<&str> {
        self.params.keys().map(|k| k.as_str()).collect()
    }

    /// Look up one parameter's derived spec.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    /// Number of declared parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the schema declares no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Validate a parameter object against the derived schema.
    ///
    /// Checks that the value is a JSON object, that every required parameter
    /// is present, that present values match their derived types, and that no
    /// undeclared keys slip through. `tool` names the owning tool in errors.
    pub fn validate(&self, tool: &str, arguments: &Value) -> Result<(), BridgeError> {
        let Some(args) = arguments.as_object() else {
            return Err(BridgeError::Validation {
                tool: tool.to_string(),
                reason: "parameters must be a JSON object".into(),
            });
        };

        for key in args.keys() {
            if !self.params.contains_key(key) {
                return Err(BridgeError::Validation {
                    tool: tool.to_string(),
                    reason: format!("unknown parameter: '{key}'"),
                });
            }
        }

        for (key, spec) in &self.params {
            match args.get(key) {
                Some(value) => check_kind(spec.kind, value).map_err(|got| {
                    BridgeError::Validation {
                        tool: tool.to_string(),
                        reason: format!(
                            "parameter '{key}' expected {}, got {got}",
                            spec.kind.name()
                        ),
                    }
                })?,
                None if spec.required => {
                    return Err(BridgeError::Validation {
                        tool: tool.to_string(),
                        reason: format!("missing required parameter: '{key}'"),
                    });
                }
                None => {}
            }
        }

        Ok(())
    }
}

// ─── Type Derivation ────────────────────────────────────────────────────────

/// Map a property descriptor's `type` tag onto a `ParamKind`.
fn derive_kind(prop: &Value) -> ParamKind {
    match prop.get("type").and_then(Value::as_str) {
        Some("string") => ParamKind::String,
        Some("number") => ParamKind::Number,
        Some("integer") => ParamKind::Integer,
        Some("boolean") => ParamKind::Boolean,
        Some("array") => ParamKind::Array(derive_item_kind(prop.get("items"))),
        Some("object") => ParamKind::Object,
        // Absent or unrecognized tag: unconstrained by design.
        _ => ParamKind::Any,
    }
}

/// Map an array descriptor's `items.type` onto an `ItemKind`.
fn derive_item_kind(items: Option<&Value>) -> ItemKind {
    match items.and_then(|i| i.get("type")).and_then(Value::as_str) {
        Some("string") => ItemKind::String,
        Some("number") => ItemKind::Number,
        Some("boolean") => ItemKind::Boolean,
        _ => ItemKind::Any,
    }
}

// ─── Value Checks ───────────────────────────────────────────────────────────

/// Check a value against a derived kind. On mismatch returns the name of the
/// JSON type actually seen, for the error message.
fn check_kind(kind: ParamKind, value: &Value) -> Result<(), &'static str> {
    let ok = match kind {
        ParamKind::String => value.is_string(),
        ParamKind::Number => value.is_number(),
        ParamKind::Integer => is_integer(value),
        ParamKind::Boolean => value.is_boolean(),
        ParamKind::Object => value.is_object(),
        ParamKind::Any => true,
        ParamKind::Array(item) => match value.as_array() {
            Some(elems) => elems.iter().all(|v| check_item(item, v)),
            None => false,
        },
    };

    if ok {
        Ok(())
    } else {
        Err(json_type_name(value))
    }
}

fn check_item(kind: ItemKind, value: &Value) -> bool {
    match kind {
        ItemKind::String => value.is_string(),
        ItemKind::Number => value.is_number(),
        ItemKind::Boolean => value.is_boolean(),
        ItemKind::Any => true,
    }
}

/// Integral check: native integers, or a float with no fractional part
/// (JSON doesn't distinguish `3` from `3.0`).
fn is_integer(value: &Value) -> bool {
    if value.as_i64().is_some() || value.as_u64().is_some() {
        return true;
    }
    value.as_f64().is_some_and(|f| f.fract() == 0.0)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
