// Process-wide defaults, loaded from the environment (or .env) on first use.

use std::env;
use std::str::FromStr;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_REPLAY_DELAY_MS: u64 = 500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_PORT: u16 = 9900;

/// Number of records shown in a dataset preview before "... and N more".
pub const PREVIEW_LIMIT: usize = 5;

/// Models offered by the UI, as `(id, label)`.
pub const MODEL_OPTIONS: &[(&str, &str)] = &[
    ("llama3.2:3b", "Llama 3.2 (3B)"),
    ("llama3.2:8b", "Llama 3.2 (8B)"),
    ("mistral:7b", "Mistral (7B)"),
    ("codellama:7b", "Code Llama (7B)"),
];

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

// Use lazy_static so .env has been loaded by the time these are first read.
lazy_static::lazy_static! {
    pub static ref OLLAMA_URL: String = env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
    pub static ref JARVIS_MODEL: String = env::var("JARVIS_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    pub static ref REPLAY_DELAY_MS: u64 = env_or("JARVIS_REPLAY_DELAY_MS", DEFAULT_REPLAY_DELAY_MS);
    pub static ref REQUEST_TIMEOUT_SECS: u64 = env_or("JARVIS_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS);
    pub static ref PORT: u16 = env_or("JARVIS_PORT", DEFAULT_PORT);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        env::set_var("JARVIS_TEST_ENV_OR_GARBAGE", "not-a-number");
        assert_eq!(env_or("JARVIS_TEST_ENV_OR_GARBAGE", 42u64), 42);
    }

    #[test]
    fn test_env_or_parses_trimmed_value() {
        env::set_var("JARVIS_TEST_ENV_OR_VALUE", " 250 ");
        assert_eq!(env_or("JARVIS_TEST_ENV_OR_VALUE", 500u64), 250);
    }

    #[test]
    fn test_default_model_is_offered() {
        assert!(MODEL_OPTIONS.iter().any(|(id, _)| *id == DEFAULT_MODEL));
    }
}
