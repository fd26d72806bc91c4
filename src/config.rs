use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a warm, patient voice companion. Listen closely, ask gentle \
     follow-up questions, and keep your answers short and friendly.";

/// Holds all configuration loaded from the environment at startup.
///
/// Constructed once before the server starts accepting connections and
/// never mutated afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub system_prompt: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5002".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let endpoint = std::env::var("VOICELIVE_ENDPOINT")
            .map_err(|_| ConfigError::MissingVar("VOICELIVE_ENDPOINT".to_string()))?;

        let api_key = std::env::var("VOICELIVE_API_KEY")
            .map_err(|_| ConfigError::MissingVar("VOICELIVE_API_KEY".to_string()))?;

        let model = std::env::var("VOICELIVE_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let voice =
            std::env::var("VOICELIVE_VOICE").unwrap_or_else(|_| "en-US-AvaNeural".to_string());

        let system_prompt = std::env::var("SYSTEM_PROMPT")
            .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            endpoint,
            api_key,
            model,
            voice,
            system_prompt,
            log_level,
        })
    }
}
