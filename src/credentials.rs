//! Credential parsing and transport configuration.
//!
//! Builds the subprocess launch configuration from host-supplied credential
//! fields merged with `MCP_*` process-environment overrides. Later sources
//! win on key collision, so a deployment can override credential values
//! without editing the stored credential.

use std::collections::HashMap;

use serde::Deserialize;

use crate::errors::BridgeError;

/// Reserved prefix for process-environment overrides.
///
/// `MCP_FOO=bar` in the host process becomes `FOO=bar` in the server
/// subprocess environment.
pub const ENV_PREFIX: &str = "MCP_";

// ─── Credentials ────────────────────────────────────────────────────────────

/// Credential fields supplied by the host's secret store.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    /// Command to execute (e.g., `npx`, `python3`).
    pub command: String,
    /// Space-delimited command line arguments.
    #[serde(default)]
    pub args: Option<String>,
    /// Comma-separated `KEY=VALUE` pairs for the subprocess environment.
    #[serde(default)]
    pub environments: Option<String>,
}

// ─── ConnectionConfig ───────────────────────────────────────────────────────

/// Resolved transport configuration for one server subprocess.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Build a configuration from credentials and a snapshot of the process
    /// environment.
    ///
    /// `process_env` is injected rather than read from `std::env` so callers
    /// control the snapshot (and tests don't mutate global state). Use
    /// `std::env::vars()` at the boundary.
    pub fn from_credentials(
        credentials: &Credentials,
        process_env: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, BridgeError> {
        if credentials.command.trim().is_empty() {
            return Err(BridgeError::Connection {
                reason: "credential 'command' must not be empty".into(),
            });
        }

        let args: Vec<String> = credentials
            .args
            .as_deref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        let mut env = credentials
            .environments
            .as_deref()
            .map(parse_env_pairs)
            .unwrap_or_default();

        // Process-environment overlay: applied after the credential pairs so
        // it wins on key collision.
        for (key, value) in process_env {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                if !stripped.is_empty() && !value.is_empty() {
                    env.insert(stripped.to_string(), value);
                }
            }
        }

        Ok(Self {
            command: credentials.command.clone(),
            args,
            env,
        })
    }
}

/// Parse comma-separated `KEY=VALUE` pairs.
///
/// Whitespace is trimmed around each pair and around key/value. Malformed
/// pairs (no `=`, empty key) are ignored; empty values are kept.
fn parse_env_pairs(input: &str) -> HashMap<String, String> {
    let mut env = HashMap::new();

    for pair in input.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some(eq) = pair.find('=') else {
            continue;
        };
        let key = pair[..eq].trim();
        let value = pair[eq + 1..].trim();
        if key.is_empty() {
            continue;
        }
        env.insert(key.to_string(), value.to_string());
    }

    env
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(command: &str, args: Option<&str>, environments: Option<&str>) -> Credentials {
        Credentials {
            command: command.to_string(),
            args: args.map(String::from),
            environments: environments.map(String::from),
        }
    }

    #[test]
    fn test_args_split_on_whitespace() {
        let config = ConnectionConfig::from_credentials(
            &creds("echo", Some("hello world"), None),
            std::iter::empty(),
        )
        .unwrap();
        assert_eq!(config.command, "echo");
        assert_eq!(config.args, vec!["hello", "world"]);
    }

    #[test]
    fn test_args_absent_yields_empty() {
        let config =
            ConnectionConfig::from_credentials(&creds("npx", None, None), std::iter::empty())
                .unwrap();
        assert!(config.args.is_empty());
    }

    #[test]
    fn test_empty_command_rejected() {
        let err = ConnectionConfig::from_credentials(&creds("  ", None, None), std::iter::empty())
            .unwrap_err();
        assert!(matches!(err, BridgeError::Connection { .. }));
    }

    #[test]
    fn test_parse_env_pairs_trims_whitespace() {
        let env = parse_env_pairs(" API_KEY = abc123 , REGION=us-east-1 ");
        assert_eq!(env.len(), 2);
        assert_eq!(env["API_KEY"], "abc123");
        assert_eq!(env["REGION"], "us-east-1");
    }

    #[test]
    fn test_parse_env_pairs_ignores_malformed() {
        // No '=' and empty key are dropped; empty segments skipped.
        let env = parse_env_pairs("GOOD=1,no_equals,,=no_key,ALSO_GOOD=2");
        assert_eq!(env.len(), 2);
        assert_eq!(env["GOOD"], "1");
        assert_eq!(env["ALSO_GOOD"], "2");
    }

    #[test]
    fn test_parse_env_pairs_keeps_empty_value() {
        let env = parse_env_pairs("EMPTY=");
        assert_eq!(env["EMPTY"], "");
    }

    #[test]
    fn test_parse_env_pairs_value_may_contain_equals() {
        let env = parse_env_pairs("TOKEN=abc=def");
        assert_eq!(env["TOKEN"], "abc=def");
    }

    #[test]
    fn test_overlay_strips_prefix() {
        let process_env = vec![("MCP_API_KEY".to_string(), "from-env".to_string())];
        let config =
            ConnectionConfig::from_credentials(&creds("server", None, None), process_env).unwrap();
        assert_eq!(config.env["API_KEY"], "from-env");
        assert!(!config.env.contains_key("MCP_API_KEY"));
    }

    #[test]
    fn test_overlay_overrides_credential_value() {
        let process_env = vec![("MCP_API_KEY".to_string(), "from-env".to_string())];
        let config = ConnectionConfig::from_credentials(
            &creds("server", None, Some("API_KEY=from-creds,REGION=eu")),
            process_env,
        )
        .unwrap();
        assert_eq!(config.env["API_KEY"], "from-env");
        assert_eq!(config.env["REGION"], "eu");
    }

    #[test]
    fn test_overlay_ignores_unprefixed_keys() {
        let process_env = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("MCP_ONLY".to_string(), "yes".to_string()),
        ];
        let config =
            ConnectionConfig::from_credentials(&creds("server", None, None), process_env).unwrap();
        assert_eq!(config.env.len(), 1);
        assert_eq!(config.env["ONLY"], "yes");
    }

    #[test]
    fn test_overlay_skips_bare_prefix_and_empty_values() {
        let process_env = vec![
            ("MCP_".to_string(), "orphan".to_string()),
            ("MCP_EMPTY".to_string(), String::new()),
        ];
        let config =
            ConnectionConfig::from_credentials(&creds("server", None, None), process_env).unwrap();
        assert!(config.env.is_empty());
    }
}
