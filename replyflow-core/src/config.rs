use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Smallest polling interval the engine accepts.
pub const MIN_INTERVAL_MS: u64 = 5_000;

/// Polling interval used when the environment does not specify one.
pub const DEFAULT_INTERVAL_MS: u64 = 30_000;

/// Reply cap used when the environment does not specify one.
pub const DEFAULT_MAX_REPLIES_PER_POST: u32 = 3;

/// Prompt used until the operator configures their own.
pub const DEFAULT_PROMPT: &str = "\
You are an active social media user who enjoys chatting with people.

RULES:
- Reply like a regular person, never like an AI or a bot
- Keep a casual, natural tone
- Never use phrases such as \"as an AI\", \"based on the information\", or \"according to the data\"
- Make every reply feel personal and genuine
- Do not use emoji
- Answer as if you know the topic of the post first-hand
- Answer questions directly; never point people elsewhere
- Keep it short and to the point";

/// Secrets sourced from the environment. Never written to disk.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub access_token: String,
    pub gemini_api_key: String,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            access_token: env::var("THREADS_ACCESS_TOKEN").unwrap_or_default(),
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.gemini_api_key.is_empty()
    }
}

/// Process-wide engine configuration. Mutated only through
/// `ReplyEngine::update_settings`; there is no implicit save-on-write.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub max_replies_per_post: u32,
    pub custom_prompt: String,
    pub credentials: Credentials,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: DEFAULT_INTERVAL_MS,
            max_replies_per_post: DEFAULT_MAX_REPLIES_PER_POST,
            custom_prompt: DEFAULT_PROMPT.to_string(),
            credentials: Credentials::default(),
        }
    }
}

impl EngineConfig {
    /// Build a configuration from the process environment. Out-of-range
    /// numeric values fall back to defaults rather than failing startup.
    pub fn from_env() -> Self {
        let enabled = env::var("AUTO_REPLY_ENABLED")
            .map(|v| v == "true")
            .unwrap_or(false);
        let interval_ms = env::var("AUTO_REPLY_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms >= MIN_INTERVAL_MS)
            .unwrap_or(DEFAULT_INTERVAL_MS);
        let max_replies_per_post = env::var("MAX_REPLIES_PER_POST")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|cap| *cap >= 1)
            .unwrap_or(DEFAULT_MAX_REPLIES_PER_POST);

        Self {
            enabled,
            interval_ms,
            max_replies_per_post,
            custom_prompt: DEFAULT_PROMPT.to_string(),
            credentials: Credentials::from_env(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Checks the fields a `start()` call depends on.
    pub fn validate_for_start(&self) -> Result<(), ConfigError> {
        if self.credentials.access_token.is_empty() {
            return Err(ConfigError::MissingCredential {
                name: "THREADS_ACCESS_TOKEN".to_string(),
            });
        }
        if self.credentials.gemini_api_key.is_empty() {
            return Err(ConfigError::MissingCredential {
                name: "GEMINI_API_KEY".to_string(),
            });
        }
        if self.interval_ms < MIN_INTERVAL_MS {
            return Err(ConfigError::InvalidValue {
                field: "interval_ms".to_string(),
                value: self.interval_ms.to_string(),
            });
        }
        if self.max_replies_per_post < 1 {
            return Err(ConfigError::InvalidValue {
                field: "max_replies_per_post".to_string(),
                value: self.max_replies_per_post.to_string(),
            });
        }
        Ok(())
    }

    /// Applies a partial settings update. Validation happens before any
    /// field is touched, so a rejected update changes nothing.
    pub fn apply_update(&mut self, update: SettingsUpdate) -> Result<(), ConfigError> {
        if let Some(interval_ms) = update.interval_ms {
            if interval_ms < MIN_INTERVAL_MS {
                return Err(ConfigError::InvalidValue {
                    field: "interval_ms".to_string(),
                    value: interval_ms.to_string(),
                });
            }
        }
        if let Some(cap) = update.max_replies_per_post {
            if cap < 1 {
                return Err(ConfigError::InvalidValue {
                    field: "max_replies_per_post".to_string(),
                    value: cap.to_string(),
                });
            }
        }

        if let Some(interval_ms) = update.interval_ms {
            self.interval_ms = interval_ms;
        }
        if let Some(cap) = update.max_replies_per_post {
            self.max_replies_per_post = cap;
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(prompt) = update.custom_prompt {
            self.custom_prompt = prompt;
        }
        Ok(())
    }

    /// Non-credential view handed to front-end consumers.
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            enabled: self.enabled,
            interval_ms: self.interval_ms,
            max_replies_per_post: self.max_replies_per_post,
            custom_prompt: self.custom_prompt.clone(),
        }
    }
}

/// Partial update coming from the settings surface. Credentials are
/// deliberately absent; they only ever come from the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub interval_ms: Option<u64>,
    pub max_replies_per_post: Option<u32>,
    pub custom_prompt: Option<String>,
}

/// Non-credential configuration snapshot for API consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    pub enabled: bool,
    pub interval_ms: u64,
    pub max_replies_per_post: u32,
    pub custom_prompt: String,
}
