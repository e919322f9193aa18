use std::net::SocketAddr;

use crate::config::models::ServerConfig;

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if config.port.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "port".to_string(),
            });
        } else if let Err(e) = Self::validate_listen_address(&config.listen_addr()) {
            errors.push(e);
        }

        if config.drain_timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "drain_timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if config.compression_level > 9 {
            errors.push(ValidationError::InvalidField {
                field: "compression_level".to_string(),
                message: format!("Must be between 0 and 9, got {}", config.compression_level),
            });
        }

        if config.log.level.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "log.level".to_string(),
            });
        }

        if config.token.ttl_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "token.ttl_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if let Some(scope) = config.token.scopes.iter().find(|s| s.trim().is_empty()) {
            errors.push(ValidationError::InvalidField {
                field: "token.scopes".to_string(),
                message: format!("Scope names must not be blank, got {scope:?}"),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            }),
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        let mut message = format!("{} configuration errors:", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("\n  {}. {}", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(ServerConfigValidator::validate(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn test_empty_port_is_rejected() {
        let config = ServerConfig {
            port: String::new(),
            ..ServerConfig::default()
        };

        assert_eq!(
            ServerConfigValidator::validate(&config),
            Err(ValidationError::MissingField {
                field: "port".to_string()
            })
        );
    }

    #[test]
    fn test_non_numeric_port_is_rejected() {
        let config = ServerConfig {
            port: "http".to_string(),
            ..ServerConfig::default()
        };

        assert!(matches!(
            ServerConfigValidator::validate(&config),
            Err(ValidationError::InvalidListenAddress { .. })
        ));
    }

    #[test]
    fn test_multiple_errors_are_collected() {
        let config = ServerConfig {
            drain_timeout_secs: 0,
            compression_level: 12,
            ..ServerConfig::default()
        };

        let err = ServerConfigValidator::validate(&config).unwrap_err();
        let ValidationError::ValidationFailed { message } = &err else {
            panic!("expected ValidationFailed, got {err:?}");
        };
        assert!(message.starts_with("2 configuration errors:"));
        assert!(message.contains("drain_timeout_secs"));
        assert!(message.contains("compression_level"));
    }
}
