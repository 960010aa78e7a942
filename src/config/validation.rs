//! Configuration validation logic.

use url::Url;

use crate::config::schema::{Config, Node, Service};

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

const LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["json", "text"];
const HANDLER_TYPES: &[&str] = &["http", "tcp"];

/// Validate a Config for semantic correctness.
///
/// Collects every error rather than failing fast, so a broken file can be
/// fixed in one pass.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.addr.is_empty() {
        errors.push(ValidationError("server.addr is required".into()));
    }

    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        errors.push(ValidationError(format!(
            "invalid logging.level '{}' (must be debug, info, warn or error)",
            config.logging.level
        )));
    }
    if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
        errors.push(ValidationError(format!(
            "invalid logging.format '{}' (must be json or text)",
            config.logging.format
        )));
    }

    if let Some(proxy) = &config.default_proxy {
        if let Err(e) = validate_proxy_url(proxy) {
            errors.push(ValidationError(format!("invalid default_proxy: {}", e)));
        }
    }

    if config.services.is_empty() {
        errors.push(ValidationError("at least one service must be defined".into()));
    }

    for (i, service) in config.services.iter().enumerate() {
        validate_service(i, service, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_service(index: usize, service: &Service, errors: &mut Vec<ValidationError>) {
    let label = if service.name.is_empty() {
        format!("service #{}", index)
    } else {
        format!("service '{}'", service.name)
    };

    if service.name.is_empty() {
        errors.push(ValidationError(format!("{}: name is required", label)));
    }

    if !HANDLER_TYPES.contains(&service.handler.kind.as_str()) {
        errors.push(ValidationError(format!(
            "{}: invalid handler type '{}' (must be http or tcp)",
            label, service.handler.kind
        )));
    }

    if service.listener.kind != "tcp" {
        errors.push(ValidationError(format!(
            "{}: invalid listener type '{}' (must be tcp)",
            label, service.listener.kind
        )));
    }

    if service.forwarder.nodes.is_empty() {
        errors.push(ValidationError(format!(
            "{}: at least one node must be defined",
            label
        )));
    }

    for (i, node) in service.forwarder.nodes.iter().enumerate() {
        validate_node(&label, i, node, errors);
    }
}

fn validate_node(service: &str, index: usize, node: &Node, errors: &mut Vec<ValidationError>) {
    let label = if node.name.is_empty() {
        format!("{}, node #{}", service, index)
    } else {
        format!("{}, node '{}'", service, node.name)
    };

    if node.name.is_empty() {
        errors.push(ValidationError(format!("{}: name is required", label)));
    }
    if node.addr.is_empty() {
        errors.push(ValidationError(format!("{}: addr is required", label)));
    }

    match (&node.filter, &node.matcher) {
        (None, None) => errors.push(ValidationError(format!(
            "{}: node must have either filter or matcher",
            label
        ))),
        (Some(_), Some(_)) => errors.push(ValidationError(format!(
            "{}: node cannot have both filter and matcher",
            label
        ))),
        (Some(filter), None) if filter.host.is_empty() => {
            errors.push(ValidationError(format!("{}: filter host is required", label)))
        }
        (None, Some(matcher)) if matcher.rule.is_empty() => {
            errors.push(ValidationError(format!("{}: matcher rule is required", label)))
        }
        _ => {}
    }

    if let Some(proxy) = &node.proxy {
        if let Err(e) = validate_proxy_url(proxy) {
            errors.push(ValidationError(format!("{}: invalid proxy URL: {}", label, e)));
        }
    }
}

fn validate_proxy_url(proxy: &str) -> Result<(), String> {
    let url = Url::parse(proxy).map_err(|e| e.to_string())?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("proxy scheme must be http or https, got: {}", other)),
    }

    if url.host_str().is_none() {
        return Err("proxy host is required".into());
    }

    Ok(())
}
