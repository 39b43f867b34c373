use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use claimdesk_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "CLAIMDESK_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "CLAIMDESK_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "CLAIMDESK_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "CLAIMDESK_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "CLAIMDESK_SERVER_PORT"),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", "CLAIMDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ));

    lines.push(render_line(
        "workflow.sla_days",
        &config.workflow.sla_days.to_string(),
        source("workflow.sla_days", "CLAIMDESK_WORKFLOW_SLA_DAYS"),
    ));
    lines.push(render_line(
        "workflow.outbox_interval_secs",
        &config.workflow.outbox_interval_secs.to_string(),
        source("workflow.outbox_interval_secs", "CLAIMDESK_WORKFLOW_OUTBOX_INTERVAL_SECS"),
    ));
    lines.push(render_line(
        "workflow.outbox_max_attempts",
        &config.workflow.outbox_max_attempts.to_string(),
        source("workflow.outbox_max_attempts", "CLAIMDESK_WORKFLOW_OUTBOX_MAX_ATTEMPTS"),
    ));

    lines.push(render_line(
        "email.enabled",
        &config.email.enabled.to_string(),
        source("email.enabled", "CLAIMDESK_EMAIL_ENABLED"),
    ));
    lines.push(render_line(
        "email.endpoint",
        config.email.endpoint.as_deref().unwrap_or("<unset>"),
        source("email.endpoint", "CLAIMDESK_EMAIL_ENDPOINT"),
    ));
    let api_key = match &config.email.api_key {
        Some(key) => redact_token(key.expose_secret()),
        None => "<unset>".to_string(),
    };
    lines.push(render_line(
        "email.api_key",
        &api_key,
        source("email.api_key", "CLAIMDESK_EMAIL_API_KEY"),
    ));
    lines.push(render_line(
        "email.from_address",
        &config.email.from_address,
        source("email.from_address", "CLAIMDESK_EMAIL_FROM_ADDRESS"),
    ));
    lines.push(render_line(
        "email.timeout_secs",
        &config.email.timeout_secs.to_string(),
        source("email.timeout_secs", "CLAIMDESK_EMAIL_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "CLAIMDESK_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "CLAIMDESK_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("claimdesk.toml"), PathBuf::from("config/claimdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps at most the first four characters of a secret.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.chars().count() <= 8 {
        return "<redacted>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}
