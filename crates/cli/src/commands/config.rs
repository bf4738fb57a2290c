use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use readmit_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let api_key = if config.oracle.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let fields: Vec<(&str, &str, String)> = vec![
        (
            "oracle.provider",
            "READMIT_ORACLE_PROVIDER",
            format!("{:?}", config.oracle.provider).to_lowercase(),
        ),
        (
            "oracle.base_url",
            "READMIT_ORACLE_BASE_URL",
            config.oracle.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("oracle.api_key", "READMIT_ORACLE_API_KEY", api_key.to_string()),
        (
            "oracle.timeout_secs",
            "READMIT_ORACLE_TIMEOUT_SECS",
            config.oracle.timeout_secs.to_string(),
        ),
        (
            "oracle.max_retries",
            "READMIT_ORACLE_MAX_RETRIES",
            config.oracle.max_retries.to_string(),
        ),
        (
            "server.bind_address",
            "READMIT_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        ("server.port", "READMIT_SERVER_PORT", config.server.port.to_string()),
        (
            "server.graceful_shutdown_secs",
            "READMIT_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        ("logging.level", "READMIT_LOGGING_LEVEL", config.logging.level.clone()),
        (
            "logging.format",
            "READMIT_LOGGING_FORMAT",
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, env_key, value) in fields {
        let source = field_source(
            key_path,
            env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {key_path} = {value} (source: {source})"));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("readmit.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/readmit.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
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
