//! Process configuration read from the environment
//!
//! A `.env` file in the working directory is loaded first (if present), so
//! local development only needs `GOOGLE_API_KEY=...` in that file.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(120);

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub llm: LlmConfig,
    pub turn: TurnConfig,
    /// Alpha Vantage key for the stock quote tool
    pub alphavantage_api_key: Option<String>,
}

/// Model and embedding provider settings
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub google_api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
}

/// Limits applied to every turn
#[derive(Debug, Clone, Copy)]
pub struct TurnConfig {
    /// Model calls per turn that may request tools
    pub max_tool_rounds: u32,
    pub timeout: Duration,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            timeout: DEFAULT_TURN_TIMEOUT,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = get("THREAD_CHAT_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let max_tool_rounds = get("THREAD_CHAT_MAX_TOOL_ROUNDS")
            .and_then(|v| v.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(DEFAULT_MAX_TOOL_ROUNDS);

        let timeout = get("THREAD_CHAT_TURN_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|n: &u64| *n > 0)
            .map_or(DEFAULT_TURN_TIMEOUT, Duration::from_secs);

        Self {
            port,
            llm: LlmConfig {
                google_api_key: get("GOOGLE_API_KEY"),
                chat_model: get("THREAD_CHAT_MODEL")
                    .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
                embedding_model: get("THREAD_CHAT_EMBEDDING_MODEL")
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            },
            turn: TurnConfig {
                max_tool_rounds,
                timeout,
            },
            alphavantage_api_key: get("ALPHAVANTAGE_API_KEY"),
        }
    }
}
