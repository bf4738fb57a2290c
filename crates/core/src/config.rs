use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub oracle: OracleConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct OracleConfig {
    pub provider: OracleProvider,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleProvider {
    Builtin,
    Http,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub oracle_provider: Option<OracleProvider>,
    pub oracle_base_url: Option<String>,
    pub oracle_api_key: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig {
                provider: OracleProvider::Builtin,
                base_url: None,
                api_key: None,
                timeout_secs: 30,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for OracleProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "builtin" => Ok(Self::Builtin),
            "http" => Ok(Self::Http),
            other => Err(ConfigError::Validation(format!(
                "unsupported oracle provider `{other}` (expected builtin|http)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    oracle: Option<OraclePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct OraclePatch {
    provider: Option<OracleProvider>,
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("readmit.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(oracle) = patch.oracle {
            if let Some(provider) = oracle.provider {
                self.oracle.provider = provider;
            }
            if let Some(base_url) = oracle.base_url {
                self.oracle.base_url = Some(base_url);
            }
            if let Some(api_key_value) = oracle.api_key {
                self.oracle.api_key = Some(secret_value(api_key_value));
            }
            if let Some(timeout_secs) = oracle.timeout_secs {
                self.oracle.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = oracle.max_retries {
                self.oracle.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("READMIT_ORACLE_PROVIDER") {
            self.oracle.provider = value.parse()?;
        }
        if let Some(value) = read_env("READMIT_ORACLE_BASE_URL") {
            self.oracle.base_url = Some(value);
        }
        if let Some(value) = read_env("READMIT_ORACLE_API_KEY") {
            self.oracle.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("READMIT_ORACLE_TIMEOUT_SECS") {
            self.oracle.timeout_secs = parse_u64("READMIT_ORACLE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("READMIT_ORACLE_MAX_RETRIES") {
            self.oracle.max_retries = parse_u32("READMIT_ORACLE_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("READMIT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("READMIT_SERVER_PORT") {
            self.server.port = parse_u16("READMIT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("READMIT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("READMIT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("READMIT_LOGGING_LEVEL").or_else(|| read_env("READMIT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("READMIT_LOGGING_FORMAT").or_else(|| read_env("READMIT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(provider) = overrides.oracle_provider {
            self.oracle.provider = provider;
        }
        if let Some(base_url) = overrides.oracle_base_url {
            self.oracle.base_url = Some(base_url);
        }
        if let Some(api_key) = overrides.oracle_api_key {
            self.oracle.api_key = Some(secret_value(api_key));
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oracle.provider == OracleProvider::Http && self.oracle.base_url.is_none() {
            return Err(ConfigError::Validation(
                "oracle provider `http` requires oracle.base_url".to_string(),
            ));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "oracle.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.bind_address must not be empty".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must not be zero".to_string()));
        }
        match self.logging.level.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "unsupported logging level `{other}` (expected trace|debug|info|warn|error)"
            ))),
        }
    }

    /// Effective configuration rendered for the operator, with secrets
    /// redacted.
    pub fn redacted_summary(&self) -> String {
        let api_key = match &self.oracle.api_key {
            Some(secret) if !secret.expose_secret().is_empty() => "<redacted>",
            _ => "<unset>",
        };
        let base_url = self.oracle.base_url.as_deref().unwrap_or("<unset>");

        [
            "[oracle]".to_string(),
            format!("provider = {:?}", self.oracle.provider).to_lowercase(),
            format!("base_url = {base_url}"),
            format!("api_key = {api_key}"),
            format!("timeout_secs = {}", self.oracle.timeout_secs),
            format!("max_retries = {}", self.oracle.max_retries),
            String::new(),
            "[server]".to_string(),
            format!("bind_address = {}", self.server.bind_address),
            format!("port = {}", self.server.port),
            format!("graceful_shutdown_secs = {}", self.server.graceful_shutdown_secs),
            String::new(),
            "[logging]".to_string(),
            format!("level = {}", self.logging.level),
            format!("format = {:?}", self.logging.format).to_lowercase(),
        ]
        .join("\n")
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("readmit.toml"), PathBuf::from("config/readmit.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replace `${VAR}` expressions with their environment values before TOML
/// parsing. Unset variables are a hard error so a half-configured deployment
/// fails fast.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(ConfigError::UnterminatedInterpolation);
        };
        let var = &after[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}
