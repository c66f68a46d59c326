// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading for uasrv.
//!
//! ```text
//!  file ──extension──► ConfigFormat
//!   │
//!   ▼
//!  ${VAR} / ${VAR:default} expansion   (environment on)
//!   │
//!   ▼
//!  deserialize ──► ServerConfig
//!   │
//!   ▼
//!  UASRV_* overrides                   (environment on)
//!   │
//!   ▼
//!  validate()
//! ```
//!
//! Recognized overrides, shown with the default prefix:
//!
//! | Variable | Field |
//! |---|---|
//! | `UASRV_SERVER_PORT` | `server.port` |
//! | `UASRV_SERVER_BIND_ADDRESS` | `server.bind_address` |
//! | `UASRV_SERVER_MAX_CONNECTIONS` | `server.max_connections` |
//! | `UASRV_SESSION_MAX_SESSIONS` | `session.max_sessions` |
//! | `UASRV_MONITORED_ITEM_DISCARD_OLDEST` | `monitored_item.discard_oldest` |
//! | `UASRV_LOG_LEVEL` | `logging.level` |
//! | `UASRV_LOG_FORMAT` | `logging.format` |

use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{LogFormat, LogLevel, ServerConfig};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "UASRV";

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML, read through the `config` crate.
    Yaml,
    /// TOML.
    Toml,
    /// JSON.
    Json,
}

impl ConfigFormat {
    /// Picks the format from a file extension, case-insensitively.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            "" => Err(ConfigError::unsupported_format("(none)")),
            other => Err(ConfigError::unsupported_format(other)),
        }
    }

    /// Returns the lowercase format name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }

    /// Deserializes `content` in this format.
    pub fn parse<T: DeserializeOwned>(self, content: &str) -> ConfigResult<T> {
        match self {
            Self::Yaml => config::Config::builder()
                .add_source(config::File::from_str(content, config::FileFormat::Yaml))
                .build()
                .and_then(|built| built.try_deserialize())
                .map_err(|e| ConfigError::malformed("yaml", e.to_string())),
            Self::Toml => {
                toml::from_str(content).map_err(|e| ConfigError::malformed("toml", e.message()))
            }
            Self::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::malformed("json", e.to_string()).with_line(e.line())),
        }
    }
}

// =============================================================================
// ConfigLoader
// =============================================================================

/// Reads, expands, overrides and validates a [`ServerConfig`].
///
/// ```no_run
/// use uasrv_config::ConfigLoader;
///
/// let config = ConfigLoader::new().with_env_vars(false).load("uasrv.yaml")?;
/// # Ok::<(), uasrv_config::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env_prefix: String,
    use_environment: bool,
}

impl ConfigLoader {
    /// Creates a loader that consults the process environment under the
    /// `UASRV` prefix.
    pub fn new() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            use_environment: true,
        }
    }

    /// Uses `prefix` instead of `UASRV` for overrides.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Turns placeholder expansion and overrides on or off.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.use_environment = enabled;
        self
    }

    /// Loads a file. The format follows the extension.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<ServerConfig> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;

        info!(path = %path.display(), format = format.name(), "Loading configuration");
        let config = self
            .load_from_str(&content, format)
            .map_err(|e| e.in_file(path))?;
        debug!(
            listen = %config.server.socket_addr(),
            max_connections = config.server.max_connections,
            max_sessions = config.session.max_sessions,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads a document held in memory.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<ServerConfig> {
        let env = |name: &str| std::env::var(name).ok();
        let mut config: ServerConfig = if self.use_environment {
            format.parse(&expand_placeholders(content, env))?
        } else {
            format.parse(content)?
        };
        if self.use_environment {
            Overrides::new(&self.env_prefix, env).apply(&mut config)?;
        }
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Environment
// =============================================================================

/// Replaces `${NAME}` and `${NAME:default}`. An unset variable without a
/// default is left as written, so the parser reports it in context.
fn expand_placeholders(content: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body_start = start + 2;
        let Some(len) = rest[body_start..].find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let body = &rest[body_start..body_start + len];
        let (name, default) = match body.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };

        match lookup(name).or_else(|| default.map(str::to_string)) {
            Some(value) => out.push_str(&value),
            None => {
                warn!(variable = name, "Unset environment variable left in configuration");
                out.push_str(&rest[start..=body_start + len]);
            }
        }
        rest = &rest[body_start + len + 1..];
    }

    out.push_str(rest);
    out
}

/// A boolean accepting the usual spellings.
struct Switch(bool);

impl FromStr for Switch {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" | "enabled" => Ok(Self(true)),
            "false" | "0" | "no" | "off" | "disabled" => Ok(Self(false)),
            _ => Err(()),
        }
    }
}

/// `PREFIX_*` variables applied on top of a parsed configuration.
struct Overrides<'a, F> {
    prefix: &'a str,
    lookup: F,
}

impl<'a, F: Fn(&str) -> Option<String>> Overrides<'a, F> {
    fn new(prefix: &'a str, lookup: F) -> Self {
        Self { prefix, lookup }
    }

    fn get<T: FromStr>(&self, key: &str, expected: &str) -> ConfigResult<Option<T>> {
        let name = format!("{}_{}", self.prefix, key);
        let Some(raw) = (self.lookup)(&name) else {
            return Ok(None);
        };
        match raw.trim().parse() {
            Ok(value) => {
                debug!(variable = %name, "Applying environment override");
                Ok(Some(value))
            }
            Err(_) => Err(ConfigError::invalid_env_var(
                name,
                format!("expected {expected}, got `{raw}`"),
            )),
        }
    }

    fn apply(&self, config: &mut ServerConfig) -> ConfigResult<()> {
        if let Some(port) = self.get("SERVER_PORT", "a port number")? {
            config.server.port = port;
        }
        if let Some(address) = self.get("SERVER_BIND_ADDRESS", "an IP address")? {
            config.server.bind_address = address;
        }
        if let Some(max) = self.get("SERVER_MAX_CONNECTIONS", "a connection count")? {
            config.server.max_connections = max;
        }
        if let Some(max) = self.get("SESSION_MAX_SESSIONS", "a session count")? {
            config.session.max_sessions = max;
        }
        if let Some(Switch(discard)) = self.get("MONITORED_ITEM_DISCARD_OLDEST", "a boolean")? {
            config.monitored_item.discard_oldest = discard;
        }
        if let Some(level) = self.get::<LogLevel>("LOG_LEVEL", "trace, debug, info, warn or error")? {
            config.logging.level = level;
        }
        if let Some(format) = self.get::<LogFormat>("LOG_FORMAT", "text, compact or json")? {
            config.logging.format = format;
        }
        Ok(())
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads a file with the default loader.
///
/// ```no_run
/// let config = uasrv_config::load_config("uasrv.yaml")?;
/// # Ok::<(), uasrv_config::ConfigError>(())
/// ```
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ServerConfig> {
    ConfigLoader::new().load(path)
}

/// Loads an in-memory document with the default loader.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<ServerConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn test_yaml() -> &'static str {
        r#"
server:
  bind_address: 127.0.0.1
  port: 4841
  max_connections: 3
  timeout_ms: 5000

session:
  max_sessions: 10

subscription:
  min_publishing_interval_ms: 100

logging:
  level: debug
  format: json
"#
    }

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_load_yaml() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(test_yaml().as_bytes()).unwrap();

        let config = ConfigLoader::new().with_env_vars(false).load(file.path()).unwrap();

        assert_eq!(config.server.port, 4841);
        assert_eq!(config.server.max_connections, 3);
        assert_eq!(config.server.socket_addr().to_string(), "127.0.0.1:4841");
        assert_eq!(config.session.max_sessions, 10);
        assert_eq!(config.subscription.min_publishing_interval_ms, 100);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_toml() {
        let toml = r#"
[server]
port = 4900
max_connections = 8

[monitored_item]
discard_oldest = false
"#;
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        file.write_all(toml.as_bytes()).unwrap();

        let config = ConfigLoader::new().with_env_vars(false).load(file.path()).unwrap();
        assert_eq!(config.server.port, 4900);
        assert_eq!(config.server.max_connections, 8);
        assert!(!config.monitored_item.discard_oldest);
    }

    #[test]
    fn test_load_json_from_str() {
        let json = r#"{"session": {"max_continuation_points": 4}}"#;
        let config = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(json, ConfigFormat::Json)
            .unwrap();
        assert_eq!(config.session.max_continuation_points, 4);
        assert_eq!(config.server.port, crate::schema::DEFAULT_PORT);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "server:\n  prot: 1\n";
        let result = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(yaml, ConfigFormat::Yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let yaml = "server:\n  max_connections: 0\n";
        let result = load_config_str(yaml, ConfigFormat::Yaml);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("uasrv.yaml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("uasrv.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("uasrv.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("uasrv.json")).unwrap(),
            ConfigFormat::Json
        );
        assert!(ConfigFormat::from_path(Path::new("uasrv.txt")).is_err());
        assert!(ConfigFormat::from_path(Path::new("uasrv")).is_err());
    }

    #[test]
    fn test_placeholder_expansion() {
        let lookup = lookup_from(&[("UA_PORT", "4999")]);
        assert_eq!(expand_placeholders("port: ${UA_PORT}", &lookup), "port: 4999");
        assert_eq!(expand_placeholders("port: ${MISSING:4840}", &lookup), "port: 4840");
        assert_eq!(expand_placeholders("port: ${MISSING}", &lookup), "port: ${MISSING}");
        assert_eq!(
            expand_placeholders("a: ${UA_PORT}, b: ${UA_PORT:1}", &lookup),
            "a: 4999, b: 4999"
        );
        assert_eq!(
            expand_placeholders("cost: $5 ${unterminated", &lookup),
            "cost: $5 ${unterminated"
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        let lookup = lookup_from(&[
            ("UASRV_SERVER_PORT", "5000"),
            ("UASRV_SERVER_BIND_ADDRESS", "127.0.0.1"),
            ("UASRV_SESSION_MAX_SESSIONS", "7"),
            ("UASRV_MONITORED_ITEM_DISCARD_OLDEST", "no"),
            ("UASRV_LOG_LEVEL", "WARNING"),
            ("UASRV_LOG_FORMAT", "compact"),
        ]);

        Overrides::new("UASRV", lookup).apply(&mut config).unwrap();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.bind_address.to_string(), "127.0.0.1");
        assert_eq!(config.session.max_sessions, 7);
        assert!(!config.monitored_item.discard_oldest);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_overrides_use_custom_prefix() {
        let mut config = ServerConfig::default();
        let lookup = lookup_from(&[("UASRV_SERVER_PORT", "5000"), ("LAB_SERVER_PORT", "5001")]);
        Overrides::new("LAB", lookup).apply(&mut config).unwrap();
        assert_eq!(config.server.port, 5001);
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = ServerConfig::default();
        let lookup = lookup_from(&[("UASRV_SERVER_PORT", "not-a-port")]);
        let result = Overrides::new("UASRV", lookup).apply(&mut config);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnvVar { ref name, .. }) if name == "UASRV_SERVER_PORT"
        ));

        let lookup = lookup_from(&[("UASRV_LOG_LEVEL", "loud")]);
        assert!(Overrides::new("UASRV", lookup).apply(&mut config).is_err());
    }

    #[test]
    fn test_switch_spellings() {
        for on in ["true", "On", "1", "YES", "enabled"] {
            assert!(on.parse::<Switch>().unwrap().0, "{on}");
        }
        for off in ["false", "off", "0", "No", "disabled"] {
            assert!(!off.parse::<Switch>().unwrap().0, "{off}");
        }
        assert!("maybe".parse::<Switch>().is_err());
    }

    #[test]
    fn test_format_parse_reports_json_line() {
        let err = ConfigFormat::Json
            .parse::<ServerConfig>("{\n  \"server\": {\n    \"port\": \"x\"\n  }\n}")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: "json", line: Some(3), .. }));
    }

    #[test]
    fn test_file_not_found() {
        let result = ConfigLoader::new().load("/nonexistent/path/uasrv.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }
}
