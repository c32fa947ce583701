use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::chatbot::cache::CACHE_LIMIT;
use crate::chatbot::telegram::PresenceKind;

/// Model used when the config does not name one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

const DEFAULT_HEALTH_PORT: u16 = 10000;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file '{}': {source}", path.display())]
    ParseJson { path: PathBuf, source: serde_json::Error },
    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    telegram_bot_token: String,
    /// Only messages from this chat get FAQ/AI answers. Moderation applies everywhere.
    event_chat_id: Option<i64>,
    /// Gemini API keys, tried in random order with failover.
    #[serde(default)]
    gemini_api_keys: Vec<String>,
    model: Option<String>,
    /// JSON file with the event schedule and rules.
    knowledge_path: Option<String>,
    /// Channel references offered to the model, in display order: [label, reference].
    #[serde(default)]
    channels: Vec<(String, String)>,
    /// Link to the pinned schedule message.
    schedule_link: Option<String>,
    /// Replaces the default persona paragraph of the prompt.
    persona: Option<String>,
    /// Added to the built-in deny-list.
    #[serde(default)]
    extra_banned_words: Vec<String>,
    #[serde(default = "default_cache_limit")]
    cache_limit: usize,
    #[serde(default = "default_true")]
    clear_cache_on_reload: bool,
    #[serde(default = "default_hint_probability")]
    hint_probability: f64,
    /// Post a "typing" placeholder and edit it with the answer.
    #[serde(default)]
    typing_placeholder: bool,
    /// How the answered-question count is framed: listening, watching or playing.
    #[serde(default)]
    presence_kind: PresenceKind,
    #[serde(default = "default_health_port")]
    health_port: Option<u16>,
    log_chat_id: Option<i64>,
    /// Directory for state files (logs). Defaults to current directory.
    data_dir: Option<String>,
    #[serde(default)]
    dry_run: bool,
}

fn default_cache_limit() -> usize {
    CACHE_LIMIT
}

fn default_true() -> bool {
    true
}

fn default_hint_probability() -> f64 {
    0.2
}

fn default_health_port() -> Option<u16> {
    Some(DEFAULT_HEALTH_PORT)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    /// `None` means every chat is in scope.
    pub event_chat_id: Option<i64>,
    pub gemini_api_keys: Vec<String>,
    pub model: String,
    pub knowledge_path: PathBuf,
    pub channels: Vec<(String, String)>,
    pub schedule_link: Option<String>,
    pub persona: Option<String>,
    pub extra_banned_words: Vec<String>,
    pub cache_limit: usize,
    pub clear_cache_on_reload: bool,
    pub hint_probability: f64,
    pub typing_placeholder: bool,
    pub presence_kind: PresenceKind,
    pub health_port: Option<u16>,
    pub log_chat_id: Option<i64>,
    pub data_dir: PathBuf,
    pub dry_run: bool,
}

/// Split a comma-separated key list, dropping blanks.
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load from a JSON file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env(path, env_non_empty)
    }

    /// Like [`Config::load`] but with an injectable environment lookup.
    pub fn load_with_env<P, E>(path: P, env: E) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        E: Fn(&str) -> Option<String>,
    {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        let telegram_bot_token = env("TELEGRAM_BOT_TOKEN").unwrap_or(file.telegram_bot_token);
        if telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let gemini_api_keys = if let Some(raw) = env("GEMINI_API_KEYS") {
            parse_key_list(&raw)
        } else if let Some(single) = env("GEMINI_API_KEY") {
            vec![single.trim().to_string()]
        } else {
            file.gemini_api_keys
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect()
        };

        let event_chat_id = match env("EVENT_CHAT_ID") {
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
                ConfigError::Validation(format!("EVENT_CHAT_ID must be a numeric chat ID, got '{raw}'"))
            })?),
            None => file.event_chat_id,
        };

        if !(0.0..=1.0).contains(&file.hint_probability) {
            return Err(ConfigError::Validation("hint_probability must be between 0 and 1".into()));
        }
        if file.cache_limit == 0 {
            return Err(ConfigError::Validation("cache_limit must be at least 1".into()));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token,
            event_chat_id,
            gemini_api_keys,
            model: file.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            knowledge_path: PathBuf::from(file.knowledge_path.unwrap_or_else(|| "event.json".to_string())),
            channels: file.channels,
            schedule_link: file.schedule_link,
            persona: file.persona,
            extra_banned_words: file.extra_banned_words,
            cache_limit: file.cache_limit,
            clear_cache_on_reload: file.clear_cache_on_reload,
            hint_probability: file.hint_probability,
            typing_placeholder: file.typing_placeholder,
            presence_kind: file.presence_kind,
            health_port: file.health_port,
            log_chat_id: file.log_chat_id,
            data_dir,
            dry_run: file.dry_run,
        })
    }

    /// Degraded-but-valid settings the operator should hear about at startup.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.gemini_api_keys.is_empty() {
            warnings.push("No Gemini API keys configured; AI answers will fail");
        }
        if self.event_chat_id.is_none() {
            warnings.push("No event_chat_id configured; answering in every chat");
        }
        warnings
    }
}
