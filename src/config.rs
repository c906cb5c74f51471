use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: String,
    pub or_model: String,
    pub ai_timeout_secs: u64,
    pub ai_max_tokens: u32,
    pub station_store_url: Option<String>,
    pub poll_interval_secs: u64,
    pub history_len: usize,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            // A missing key is a valid setup: suggestions come from the local fallback.
            openrouter_api_key: optional_var("OPENROUTER_API_KEY"),
            openrouter_base_url: env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1/chat/completions".to_string()),
            or_model: env::var("OR_MODEL")
                .unwrap_or_else(|_| "deepseek/deepseek-chat-v3-0324:free".to_string()),
            ai_timeout_secs: parsed_var("AI_TIMEOUT_SECS", 20)?,
            ai_max_tokens: parsed_var("AI_MAX_TOKENS", 800)?,
            station_store_url: optional_var("STATION_STORE_URL"),
            poll_interval_secs: parsed_var("POLL_INTERVAL_SECS", 10)?,
            history_len: parsed_var("HISTORY_LEN", 20)?,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }

    pub fn has_ai_credential(&self) -> bool {
        self.openrouter_api_key.is_some()
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} is invalid ({}): {}", key, raw, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            openrouter_api_key: None,
            openrouter_base_url: "http://127.0.0.1:9/chat/completions".to_string(),
            or_model: "test-model".to_string(),
            ai_timeout_secs: 5,
            ai_max_tokens: 800,
            station_store_url: None,
            poll_interval_secs: 10,
            history_len: 20,
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }
}
