//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::Config;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load, default and validate configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config: Config = serde_yaml::from_str(&content).map_err(ConfigError::Parse)?;

    apply_defaults(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Fill in optional fields the schema leaves empty.
///
/// Runs before validation so the validator sees the effective config.
pub fn apply_defaults(config: &mut Config) {
    for service in &mut config.services {
        if service.addr.is_none() {
            service.addr = Some(config.server.addr.clone());
        }
        if service.handler.kind.is_empty() {
            service.handler.kind = "http".to_string();
        }
        if service.listener.kind.is_empty() {
            service.listener.kind = "tcp".to_string();
        }
        for node in &mut service.forwarder.nodes {
            if node.proxy.is_none() {
                node.proxy = config.default_proxy.clone();
            }
        }
    }
}
