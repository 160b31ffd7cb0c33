//! Layered runtime configuration.
//!
//! Layers are merged as TOML tables in increasing precedence: built-in defaults,
//! the optional `mooai.toml` file (with `${VAR}` interpolation), `MOOAI_*`
//! environment variables and finally programmatic [`ConfigOverrides`]. The merged
//! table is decoded once and then validated.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use toml::{Table, Value};

use crate::attachments::AttachmentLimits;

const DEFAULT_CONFIG_FILES: [&str; 2] = ["mooai.toml", "config/mooai.toml"];

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub llm: LlmConfig,
    pub context: ContextConfig,
    pub attachments: AttachmentLimits,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://mooai.db".to_owned(), max_connections: 5, timeout_secs: 30 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    #[serde(deserialize_with = "secret")]
    pub app_token: SecretString,
    #[serde(deserialize_with = "secret")]
    pub bot_token: SecretString,
    pub api_base_url: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            app_token: SecretString::from(String::new()),
            bot_token: SecretString::from(String::new()),
            api_base_url: "https://slack.com/api".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(deserialize_with = "optional_secret")]
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub system_instructions: Option<String>,
    pub continuation_mode: ContinuationMode,
    pub structured_output: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_owned(),
            model: "gpt-4o-mini".to_owned(),
            timeout_secs: 60,
            system_instructions: None,
            continuation_mode: ContinuationMode::FullThread,
            structured_output: true,
        }
    }
}

/// Upper bound for `context.ttl_days`, ten years.
pub const MAX_CONTEXT_TTL_DAYS: i64 = 3_650;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub ttl_days: i64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { ttl_days: 30 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_owned(),
            health_check_port: 8080,
            graceful_shutdown_secs: 15,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), format: LogFormat::Compact }
    }
}

/// How conversational context reaches the model on each turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationMode {
    /// Replay the whole Slack thread (with attachments) on every turn.
    FullThread,
    /// Send only the newest message plus the stored response handle.
    ResponseHandle,
}

impl ContinuationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullThread => "full_thread",
            Self::ResponseHandle => "response_handle",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Values set by the embedding program. They beat every other layer.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub continuation_mode: Option<ContinuationMode>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_api_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("`{path}` is not valid TOML: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("config file `{0}` does not exist")]
    MissingConfigFile(PathBuf),
    #[error("`${{{var}}}` is referenced by the config file but not set")]
    MissingEnvInterpolation { var: String },
    #[error("`${{` in the config file is never closed")]
    UnterminatedInterpolation,
    #[error("`{key}` has an unusable value `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("merged configuration could not be decoded: {0}")]
    Decode(#[source] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut layers = match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => read_file_layer(&path)?,
            None if options.require_file => {
                let expected = options
                    .config_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => Table::new(),
        };

        apply_env_layer(&mut layers)?;
        options.overrides.apply_to(&mut layers);

        let config: Self = Value::Table(layers).try_into().map_err(ConfigError::Decode)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.slack.validate()?;
        self.llm.validate()?;
        if !(1..=MAX_CONTEXT_TTL_DAYS).contains(&self.context.ttl_days) {
            return Err(invalid("context.ttl_days must be between 1 and 3650"));
        }
        let limits = &self.attachments;
        if limits.max_image_bytes == 0
            || limits.max_document_bytes == 0
            || limits.max_document_pages == 0
        {
            return Err(invalid("attachments.* limits must be positive"));
        }
        self.server.validate()?;
        self.logging.validate()
    }
}

impl ConfigOverrides {
    fn apply_to(self, layers: &mut Table) {
        let text = [
            ("database", "url", self.database_url),
            ("logging", "level", self.log_level),
            ("llm", "model", self.llm_model),
            ("llm", "api_key", self.llm_api_key),
            ("llm", "base_url", self.llm_base_url),
            ("slack", "app_token", self.slack_app_token),
            ("slack", "bot_token", self.slack_bot_token),
            ("slack", "api_base_url", self.slack_api_base_url),
        ];
        for (section, field, value) in text {
            if let Some(value) = value {
                set_field(layers, section, field, Value::String(value));
            }
        }
        if let Some(mode) = self.continuation_mode {
            set_field(layers, "llm", "continuation_mode", Value::String(mode.as_str().to_owned()));
        }
    }
}

impl DatabaseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.url.trim();
        if !(url.starts_with("sqlite:") || url == ":memory:") {
            return Err(invalid(
                "database.url must point at sqlite (`sqlite://file.db`, `sqlite::memory:`)",
            ));
        }
        if self.max_connections == 0 {
            return Err(invalid("database.max_connections must be at least 1"));
        }
        if !(1..=300).contains(&self.timeout_secs) {
            return Err(invalid("database.timeout_secs must be between 1 and 300"));
        }
        Ok(())
    }
}

impl SlackConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_token(
            "slack.app_token",
            self.app_token.expose_secret(),
            "xapp-",
            "xoxb-",
            "Basic Information > App-Level Tokens",
        )?;
        check_token(
            "slack.bot_token",
            self.bot_token.expose_secret(),
            "xoxb-",
            "xapp-",
            "OAuth & Permissions > Bot User OAuth Token",
        )?;
        if !is_http_url(&self.api_base_url) {
            return Err(invalid("slack.api_base_url must be an http(s) URL"));
        }
        Ok(())
    }
}

impl LlmConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let has_key =
            self.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty());
        if !has_key {
            return Err(invalid("llm.api_key is missing; set MOOAI_LLM_API_KEY or OPENAI_API_KEY"));
        }
        if !is_http_url(&self.base_url) {
            return Err(invalid("llm.base_url must be an http(s) URL"));
        }
        if self.model.trim().is_empty() {
            return Err(invalid("llm.model must name a model"));
        }
        if !(1..=300).contains(&self.timeout_secs) {
            return Err(invalid("llm.timeout_secs must be between 1 and 300"));
        }
        Ok(())
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.health_check_port == 0 {
            return Err(invalid("server.health_check_port must be a non-zero port"));
        }
        if self.graceful_shutdown_secs == 0 {
            return Err(invalid("server.graceful_shutdown_secs must be at least 1"));
        }
        Ok(())
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if LEVELS.contains(&self.level.trim().to_ascii_lowercase().as_str()) {
            Ok(())
        } else {
            let expected = LEVELS.join("|");
            Err(invalid(format!("logging.level `{}` is not one of {expected}", self.level)))
        }
    }
}

fn check_token(
    field: &str,
    token: &str,
    prefix: &str,
    swapped_prefix: &str,
    console_path: &str,
) -> Result<(), ConfigError> {
    if token.is_empty() {
        return Err(invalid(format!(
            "{field} is missing; copy it from https://api.slack.com/apps > Your App > \
             {console_path}"
        )));
    }
    if token.starts_with(prefix) {
        return Ok(());
    }
    let swapped = if token.starts_with(swapped_prefix) {
        format!(" (that looks like a `{swapped_prefix}` token; the two may be swapped)")
    } else {
        String::new()
    };
    Err(invalid(format!("{field} must begin with `{prefix}`{swapped}")))
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

fn optional_secret<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<SecretString>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => path.is_file().then(|| path.to_path_buf()),
        None => DEFAULT_CONFIG_FILES.iter().map(PathBuf::from).find(|path| path.is_file()),
    }
}

fn read_file_layer(path: &Path) -> Result<Table, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    interpolate_env_vars(&raw)?
        .parse::<Table>()
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${NAME}` with the value of the environment variable `NAME`.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let end = tail.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let name = &tail[..end];
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_owned() })?;
        output.push_str(&value);
        rest = &tail[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

#[derive(Clone, Copy)]
enum EnvKind {
    Text,
    Integer,
    Flag,
    /// Enum values; matched case-insensitively.
    Choice,
}

struct EnvBinding {
    section: &'static str,
    field: &'static str,
    /// Checked in order; the first non-blank variable wins.
    vars: &'static [&'static str],
    kind: EnvKind,
}

const fn bind(
    section: &'static str,
    field: &'static str,
    vars: &'static [&'static str],
    kind: EnvKind,
) -> EnvBinding {
    EnvBinding { section, field, vars, kind }
}

const ENV_BINDINGS: &[EnvBinding] = &[
    bind("database", "url", &["MOOAI_DATABASE_URL"], EnvKind::Text),
    bind("database", "max_connections", &["MOOAI_DATABASE_MAX_CONNECTIONS"], EnvKind::Integer),
    bind("database", "timeout_secs", &["MOOAI_DATABASE_TIMEOUT_SECS"], EnvKind::Integer),
    bind("slack", "app_token", &["MOOAI_SLACK_APP_TOKEN"], EnvKind::Text),
    bind("slack", "bot_token", &["MOOAI_SLACK_BOT_TOKEN"], EnvKind::Text),
    bind("slack", "api_base_url", &["MOOAI_SLACK_API_BASE_URL"], EnvKind::Text),
    bind("llm", "api_key", &["MOOAI_LLM_API_KEY", "OPENAI_API_KEY"], EnvKind::Text),
    bind("llm", "base_url", &["MOOAI_LLM_BASE_URL"], EnvKind::Text),
    bind("llm", "model", &["MOOAI_LLM_MODEL"], EnvKind::Text),
    bind("llm", "timeout_secs", &["MOOAI_LLM_TIMEOUT_SECS"], EnvKind::Integer),
    bind("llm", "continuation_mode", &["MOOAI_LLM_CONTINUATION_MODE"], EnvKind::Choice),
    bind("llm", "structured_output", &["MOOAI_LLM_STRUCTURED_OUTPUT"], EnvKind::Flag),
    bind("context", "ttl_days", &["MOOAI_CONTEXT_TTL_DAYS"], EnvKind::Integer),
    bind("server", "bind_address", &["MOOAI_SERVER_BIND_ADDRESS"], EnvKind::Text),
    bind("server", "health_check_port", &["MOOAI_SERVER_HEALTH_CHECK_PORT"], EnvKind::Integer),
    bind(
        "server",
        "graceful_shutdown_secs",
        &["MOOAI_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        EnvKind::Integer,
    ),
    bind("logging", "level", &["MOOAI_LOGGING_LEVEL", "MOOAI_LOG_LEVEL"], EnvKind::Text),
    bind("logging", "format", &["MOOAI_LOGGING_FORMAT", "MOOAI_LOG_FORMAT"], EnvKind::Choice),
];

fn apply_env_layer(layers: &mut Table) -> Result<(), ConfigError> {
    for binding in ENV_BINDINGS {
        let found = binding
            .vars
            .iter()
            .find_map(|var| read_env(var).map(|value| (*var, value)));
        let Some((var, raw)) = found else {
            continue;
        };

        let value = match binding.kind {
            EnvKind::Text => Value::String(raw),
            EnvKind::Choice => Value::String(raw.trim().to_ascii_lowercase()),
            EnvKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| ConfigError::InvalidEnvOverride { key: var.to_owned(), value: raw })?,
            EnvKind::Flag => raw
                .trim()
                .parse::<bool>()
                .map(Value::Boolean)
                .map_err(|_| ConfigError::InvalidEnvOverride { key: var.to_owned(), value: raw })?,
        };
        set_field(layers, binding.section, binding.field, value);
    }
    Ok(())
}

fn set_field(layers: &mut Table, section: &str, field: &str, value: Value) {
    let entry = layers.entry(section.to_owned()).or_insert_with(|| Value::Table(Table::new()));
    if !entry.is_table() {
        *entry = Value::Table(Table::new());
    }
    if let Value::Table(table) = entry {
        table.insert(field.to_owned(), value);
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
