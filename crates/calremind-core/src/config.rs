use std::fs;
use std::path::{Path, PathBuf};

use calremind_provider::ProviderType;
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const CONFIG_FILE: &str = "config/main.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse yaml file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration:\n{}", enumerate(.0))]
    Invalid(Vec<String>),
}

fn enumerate(problems: &[String]) -> String {
    problems
        .iter()
        .enumerate()
        .map(|(i, p)| format!("  {}. {p}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalremindConfig {
    pub calendar: CalendarConfig,
    pub llm: LlmConfig,
    pub channels: ChannelsConfig,
    pub reminders: ReminderSettings,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub calendar_id: String,
    pub timezone: String,
    pub max_results: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials/credentials.json"),
            token_path: PathBuf::from("credentials/token.json"),
            calendar_id: "primary".to_string(),
            timezone: "Europe/Madrid".to_string(),
            max_results: 50,
        }
    }
}

impl CalendarConfig {
    pub fn tz(&self) -> Option<Tz> {
        self.timezone.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderType,
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::Gemini,
            api_key: "${GEMINI_API_KEY}".to_string(),
            model: "gemini-1.5-flash".to_string(),
            base_url: None,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub email: EmailConfig,
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub address: String,
    pub password: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            address: "${EMAIL_ADDRESS}".to_string(),
            password: "${EMAIL_PASSWORD}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: String,
    #[serde(deserialize_with = "string_or_number")]
    pub chat_id: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: "${TELEGRAM_BOT_TOKEN}".to_string(),
            chat_id: "${TELEGRAM_CHAT_ID}".to_string(),
        }
    }
}

/// Timing knobs consumed by the reminder engine and driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSettings {
    pub lookahead_hours: u32,
    pub check_interval_minutes: u32,
    pub retention_days: u32,
    pub due_window_seconds: i64,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            lookahead_hours: 168,
            check_interval_minutes: 15,
            retention_days: 30,
            due_window_seconds: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/reminders.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other:?}"
        ))),
    }
}

/// Expand `${VAR}` placeholders from the environment; unset variables become empty.
pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    let expanded = PathBuf::from(resolve_env_var(&path.to_string_lossy()));
    if expanded.is_absolute() {
        expanded
    } else {
        root.join(expanded)
    }
}

fn resolve_env(config: &mut CalremindConfig) {
    let llm = &mut config.llm;
    llm.api_key = resolve_env_var(&llm.api_key);
    llm.model = resolve_env_var(&llm.model);
    llm.base_url = llm
        .base_url
        .as_deref()
        .map(resolve_env_var)
        .filter(|url| !url.is_empty());

    let email = &mut config.channels.email;
    email.smtp_server = resolve_env_var(&email.smtp_server);
    email.address = resolve_env_var(&email.address);
    email.password = resolve_env_var(&email.password);

    let telegram = &mut config.channels.telegram;
    telegram.bot_token = resolve_env_var(&telegram.bot_token);
    telegram.chat_id = resolve_env_var(&telegram.chat_id);

    config.calendar.calendar_id = resolve_env_var(&config.calendar.calendar_id);
    config.calendar.timezone = resolve_env_var(&config.calendar.timezone);
}

/// Read `<root>/config/main.yaml` (absent file means all defaults), expand
/// placeholders, anchor relative paths at `root`, then validate.
pub fn load_config(root: &Path) -> Result<CalremindConfig, ConfigError> {
    let config = read_config(root)?;
    let problems = validate_config(&config);
    if !problems.is_empty() {
        return Err(ConfigError::Invalid(problems));
    }
    Ok(config)
}

/// Like [`load_config`] without validation.
pub fn read_config(root: &Path) -> Result<CalremindConfig, ConfigError> {
    let path = root.join(CONFIG_FILE);
    let mut config: CalremindConfig = if path.exists() {
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            CalremindConfig::default()
        } else {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?
        }
    } else {
        tracing::debug!("{} not found, using defaults", path.display());
        CalremindConfig::default()
    };

    resolve_env(&mut config);
    config.calendar.credentials_path = resolve_path(root, &config.calendar.credentials_path);
    config.calendar.token_path = resolve_path(root, &config.calendar.token_path);
    config.storage.db_path = resolve_path(root, &config.storage.db_path);
    Ok(config)
}

/// Every violated constraint, in a stable order. Empty means valid.
pub fn validate_config(config: &CalremindConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if config.llm.provider.requires_api_key() && config.llm.api_key.trim().is_empty() {
        problems.push(format!(
            "llm.api_key is required for provider {:?}",
            config.llm.provider
        ));
    }
    if config.llm.model.trim().is_empty() {
        problems.push("llm.model must not be empty".to_string());
    }

    let email = &config.channels.email;
    let telegram = &config.channels.telegram;
    if !email.enabled && !telegram.enabled {
        problems.push("at least one notification channel must be enabled".to_string());
    }
    if email.enabled {
        if email.address.trim().is_empty() {
            problems.push("channels.email.address is required when email is enabled".to_string());
        }
        if email.password.is_empty() {
            problems.push("channels.email.password is required when email is enabled".to_string());
        }
        if email.smtp_server.trim().is_empty() {
            problems.push("channels.email.smtp_server must not be empty".to_string());
        }
    }
    if telegram.enabled {
        if telegram.bot_token.trim().is_empty() {
            problems.push(
                "channels.telegram.bot_token is required when telegram is enabled".to_string(),
            );
        }
        if telegram.chat_id.trim().is_empty() {
            problems.push(
                "channels.telegram.chat_id is required when telegram is enabled".to_string(),
            );
        } else if telegram.chat_id.trim().parse::<i64>().is_err() {
            problems.push(format!(
                "channels.telegram.chat_id must be numeric, got {:?}",
                telegram.chat_id
            ));
        }
    }

    if !config.calendar.credentials_path.exists() {
        problems.push(format!(
            "calendar credentials file not found: {}",
            config.calendar.credentials_path.display()
        ));
    }
    if config.calendar.tz().is_none() {
        problems.push(format!(
            "calendar.timezone is not a valid IANA timezone: {:?}",
            config.calendar.timezone
        ));
    }
    if config.calendar.max_results == 0 {
        problems.push("calendar.max_results must be positive".to_string());
    }

    let reminders = &config.reminders;
    if reminders.lookahead_hours == 0 {
        problems.push("reminders.lookahead_hours must be positive".to_string());
    }
    if reminders.check_interval_minutes == 0 {
        problems.push("reminders.check_interval_minutes must be positive".to_string());
    }
    if reminders.retention_days == 0 {
        problems.push("reminders.retention_days must be positive".to_string());
    }
    if reminders.due_window_seconds < 0 {
        problems.push("reminders.due_window_seconds must not be negative".to_string());
    }

    problems
}
