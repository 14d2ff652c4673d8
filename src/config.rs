//! Provider configuration.
//!
//! The provider block may set `host`, `token`, `organization` and
//! `request_timeout_secs`. Host and token fall back to
//! [`HOST_ENV_VAR`] and [`TOKEN_ENV_VAR`] when not configured; values in the
//! block always win.

use std::time::Duration;

use serde::Deserialize;

use crate::schema::{Attribute, Diagnostic, Schema};

/// Environment variable holding the Anomalo host.
pub const HOST_ENV_VAR: &str = "ANOMALO_INSTANCE_HOST";

/// Environment variable holding the API token.
pub const TOKEN_ENV_VAR: &str = "ANOMALO_API_SECRET_TOKEN";

/// Request timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The provider block as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Anomalo host, e.g. `https://anomalo.example.com`.
    #[serde(default)]
    pub host: Option<String>,
    /// API token.
    #[serde(default)]
    pub token: Option<String>,
    /// Organization the token should act in.
    #[serde(default)]
    pub organization: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// Everything needed to build a client.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Base URL without a trailing slash.
    pub host: String,
    /// API token.
    pub token: String,
    /// Organization to switch to after connecting.
    pub organization: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSettings")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .field("organization", &self.organization)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Declarative configuration for Anomalo tables and checks.")
            .with_attribute(
                "host",
                Attribute::optional_string().with_description(format!(
                    "Your Anomalo API host, ex `https://anomalo.mycompany.com`. Falls back to {}.",
                    HOST_ENV_VAR
                )),
            )
            .with_attribute(
                "token",
                Attribute::optional_string()
                    .sensitive()
                    .with_description(format!("Your Anomalo API token. Falls back to {}.", TOKEN_ENV_VAR)),
            )
            .with_attribute(
                "organization",
                Attribute::optional_string().with_description(
                    "Name of the organization the token should act in. The provider does not \
                     switch back when it finishes.",
                ),
            )
            .with_attribute(
                "request_timeout_secs",
                Attribute::optional_int64()
                    .with_description("Timeout for each Anomalo API request, in seconds."),
            )
    }

    /// Parse the provider block. A null block is an empty configuration.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
    }

    /// Resolve against an environment lookup, reporting every missing value.
    pub fn resolve<F>(&self, env: F) -> Result<ClientSettings, Vec<Diagnostic>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = non_empty(self.host.clone()).or_else(|| non_empty(env(HOST_ENV_VAR)));
        let token = non_empty(self.token.clone()).or_else(|| non_empty(env(TOKEN_ENV_VAR)));

        let mut diagnostics = Vec::new();
        if host.is_none() {
            diagnostics.push(missing("host", "Missing Anomalo API host", HOST_ENV_VAR));
        }
        if token.is_none() {
            diagnostics.push(missing("token", "Missing Anomalo API token", TOKEN_ENV_VAR));
        }
        if self.request_timeout_secs == Some(0) {
            diagnostics.push(
                Diagnostic::error("Invalid request timeout")
                    .with_detail("request_timeout_secs must be greater than zero")
                    .with_attribute("request_timeout_secs"),
            );
        }

        match (host, token) {
            (Some(host), Some(token)) if diagnostics.is_empty() => Ok(ClientSettings {
                host: host.trim_end_matches('/').to_string(),
                token,
                organization: non_empty(self.organization.clone()),
                request_timeout: self
                    .request_timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            }),
            _ => Err(diagnostics),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn missing(attribute: &str, summary: &str, env_var: &str) -> Diagnostic {
    Diagnostic::error(summary)
        .with_detail(format!(
            "The provider cannot create the Anomalo API client because {} is missing or empty. \
             Set it in the provider configuration or use the {} environment variable.",
            attribute, env_var
        ))
        .with_attribute(attribute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_values_win_over_env() {
        let config = ProviderConfig::from_value(json!({
            "host": "https://anomalo.example.com/",
            "token": "from-config"
        }))
        .unwrap();

        let settings = config
            .resolve(env(&[(HOST_ENV_VAR, "https://other"), (TOKEN_ENV_VAR, "from-env")]))
            .unwrap();
        assert_eq!(settings.host, "https://anomalo.example.com");
        assert_eq!(settings.token, "from-config");
        assert_eq!(settings.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(settings.organization.is_none());
    }

    #[test]
    fn test_env_fallback() {
        let config = ProviderConfig::from_value(json!({"organization": "Square"})).unwrap();
        let settings = config
            .resolve(env(&[(HOST_ENV_VAR, "https://env-host"), (TOKEN_ENV_VAR, "t")]))
            .unwrap();
        assert_eq!(settings.host, "https://env-host");
        assert_eq!(settings.organization.as_deref(), Some("Square"));
    }

    #[test]
    fn test_missing_host_and_token() {
        let diagnostics = ProviderConfig::default().resolve(env(&[])).unwrap_err();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("host"));
        assert_eq!(diagnostics[1].attribute.as_deref(), Some("token"));
        assert!(diagnostics[0].detail.as_ref().unwrap().contains(HOST_ENV_VAR));
    }

    #[test]
    fn test_empty_values_count_as_missing() {
        let config = ProviderConfig {
            host: Some("  ".to_string()),
            token: Some("t".to_string()),
            ..Default::default()
        };
        let diagnostics = config.resolve(env(&[])).unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("host"));
    }

    #[test]
    fn test_timeout() {
        let config = ProviderConfig::from_value(json!({
            "host": "h", "token": "t", "request_timeout_secs": 5
        }))
        .unwrap();
        let settings = config.resolve(env(&[])).unwrap();
        assert_eq!(settings.request_timeout, Duration::from_secs(5));

        let config = ProviderConfig {
            request_timeout_secs: Some(0),
            ..config
        };
        assert!(config.resolve(env(&[])).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(ProviderConfig::from_value(json!({"hots": "typo"})).is_err());
        assert_eq!(
            ProviderConfig::from_value(serde_json::Value::Null).unwrap(),
            ProviderConfig::default()
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let settings = ProviderConfig::from_value(json!({"host": "h", "token": "secret"}))
            .unwrap()
            .resolve(env(&[]))
            .unwrap();
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
