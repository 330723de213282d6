use std::time::Duration;

use serde::Serialize;

use crate::constants;

/// Runtime settings shared (read-only) by the CLI, the web server and the
/// replay driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Base URL of the Ollama server.
    pub ollama_url: String,
    /// Model used for chat and as the default replay target.
    pub model: String,
    /// Pause before each replayed record.
    #[serde(with = "millis")]
    pub replay_delay: Duration,
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    pub port: u16,
}

impl Settings {
    /// Settings from environment variables, falling back to built-in defaults.
    pub fn from_env() -> Self {
        Self {
            ollama_url: constants::OLLAMA_URL.clone(),
            model: constants::JARVIS_MODEL.clone(),
            replay_delay: Duration::from_millis(*constants::REPLAY_DELAY_MS),
            request_timeout: Duration::from_secs(*constants::REQUEST_TIMEOUT_SECS),
            port: *constants::PORT,
        }
    }

    pub fn with_ollama_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.ollama_url = url;
        }
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.model = model;
        }
        self
    }

    pub fn with_replay_delay_ms(mut self, delay_ms: Option<u64>) -> Self {
        if let Some(ms) = delay_ms {
            self.replay_delay = Duration::from_millis(ms);
        }
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ollama_url: constants::DEFAULT_OLLAMA_URL.to_string(),
            model: constants::DEFAULT_MODEL.to_string(),
            replay_delay: Duration::from_millis(constants::DEFAULT_REPLAY_DELAY_MS),
            request_timeout: Duration::from_secs(constants::DEFAULT_REQUEST_TIMEOUT_SECS),
            port: constants::DEFAULT_PORT,
        }
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
