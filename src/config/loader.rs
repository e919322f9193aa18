use std::{collections::HashMap, path::Path};

use config::{Config, Environment, File, FileFormat};
use eyre::{Result, WrapErr};
use thiserror::Error;

use crate::config::models::ServerConfig;

/// Environment variable holding the listen port.
pub const PORT_ENV: &str = "PORT";
/// Prefix of environment overrides, e.g. `TETHER_DRAIN_TIMEOUT_SECS`.
pub const ENV_PREFIX: &str = "TETHER";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {key} must be set")]
    MissingEnvVar { key: String },
}

/// Look up `key`, falling back to `fallback` when it is not set.
///
/// A variable that is set is returned as is, even when empty. An unset
/// variable with an empty fallback is an error.
pub fn resolve_env_var(
    key: &str,
    fallback: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    if let Some(value) = lookup(key) {
        return Ok(value);
    }

    if fallback.is_empty() {
        return Err(ConfigError::MissingEnvVar {
            key: key.to_string(),
        });
    }

    Ok(fallback.to_string())
}

/// Load configuration from the process environment and an optional file.
pub fn load_config(config_path: Option<&str>) -> Result<ServerConfig> {
    load_config_from(config_path, std::env::vars().collect())
}

/// Load configuration from `env` and an optional file.
///
/// Precedence, lowest first: built-in defaults, the file, `TETHER_*`
/// variables, `PORT`.
pub fn load_config_from(
    config_path: Option<&str>,
    env: HashMap<String, String>,
) -> Result<ServerConfig> {
    let mut builder = Config::builder();

    if let Some(config_path) = config_path {
        let path = Path::new(config_path);

        // Determine file format based on extension
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            Some("ini") => FileFormat::Ini,
            _ => FileFormat::Toml,
        };

        builder = builder.add_source(File::new(config_path, format));
    }

    let settings = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("token.scopes")
                .source(Some(env.clone().into_iter().collect())),
        )
        .build()
        .wrap_err("Failed to build configuration")?;

    let mut server_config: ServerConfig = settings
        .try_deserialize()
        .wrap_err("Failed to deserialize configuration")?;

    server_config.port = resolve_env_var(PORT_ENV, &server_config.port, |key| {
        env.get(key).cloned()
    })?;

    Ok(server_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_env_var() {
        let vars = env(&[("PORT", "9090"), ("EMPTY", "")]);
        let lookup = |key: &str| vars.get(key).cloned();

        assert_eq!(resolve_env_var("PORT", "8080", lookup).unwrap(), "9090");
        assert_eq!(resolve_env_var("EMPTY", "8080", lookup).unwrap(), "");
        assert_eq!(resolve_env_var("UNSET", "8080", lookup).unwrap(), "8080");
        assert_eq!(
            resolve_env_var("UNSET", "", lookup).unwrap_err(),
            ConfigError::MissingEnvVar {
                key: "UNSET".to_string()
            }
        );
    }

    #[test]
    fn test_port_defaults_to_8080() {
        let config = load_config_from(None, HashMap::new()).unwrap();
        assert_eq!(config.port, "8080");
    }

    #[test]
    fn test_port_env_overrides_and_keeps_empty_value() {
        let config = load_config_from(None, env(&[("PORT", "3000")])).unwrap();
        assert_eq!(config.port, "3000");

        let config = load_config_from(None, env(&[("PORT", "")])).unwrap();
        assert_eq!(config.port, "");
    }

    #[test]
    fn test_prefixed_env_overrides() {
        let config = load_config_from(
            None,
            env(&[
                ("TETHER_DRAIN_TIMEOUT_SECS", "2"),
                ("TETHER_LOG__FORMAT", "pretty"),
                ("TETHER_TOKEN__SCOPES", "status:read,admin"),
            ]),
        )
        .unwrap();

        assert_eq!(config.drain_timeout_secs, 2);
        assert_eq!(config.log.format, crate::config::LogFormat::Pretty);
        assert_eq!(config.token.scopes, vec!["status:read", "admin"]);
    }

    #[test]
    fn test_load_toml_file() {
        let toml_content = r#"
host = "127.0.0.1"
port = "7000"
compression_level = 9

[token]
ttl_secs = 60
scopes = ["status:read"]
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config =
            load_config_from(Some(temp_file.path().to_str().unwrap()), HashMap::new()).unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:7000");
        assert_eq!(config.compression_level, 9);
        assert_eq!(config.token.ttl_secs, 60);
        assert_eq!(config.token.scopes, vec!["status:read"]);
    }

    #[test]
    fn test_empty_port_in_file_without_env_is_missing() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, r#"{{ "port": "" }}"#).unwrap();

        let err = load_config_from(Some(temp_file.path().to_str().unwrap()), HashMap::new())
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::MissingEnvVar {
                key: "PORT".to_string()
            })
        );
    }
}
