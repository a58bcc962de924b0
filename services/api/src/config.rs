use secrecy::SecretString;
use std::net::SocketAddr;
use tracing::Level;

pub const DEFAULT_XAI_BASE_URL: &str = "https://api.x.ai/v1";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";
/// ElevenLabs' "Rachel" voice.
pub const DEFAULT_ELEVENLABS_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which provider serves `/api/openai-chat-complete`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    Xai,
    OpenAi,
}

/// Holds all configuration loaded from the environment at startup.
///
/// Missing API keys are not an error here: the routes needing them answer
/// with a configuration error instead.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub llm_provider: LlmProvider,
    pub openai_api_key: Option<SecretString>,
    pub xai_api_key: Option<SecretString>,
    /// Key for the vision routes and the Grok chat route.
    pub grokai_api_key: Option<SecretString>,
    pub elevenlabs_api_key: Option<SecretString>,
    pub elevenlabs_voice_id: String,
    pub xai_base_url: String,
    pub openai_base_url: String,
    pub elevenlabs_base_url: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// This function will look for a `.env` file in the current directory
    /// and load the following variables:
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:3000".
    /// *   `LLM_PROVIDER`: "xai" or "openai" for the provider-switched chat route. Defaults to "xai".
    /// *   `OPENAI_API_KEY`, `XAI_API_KEY`: Keys for the chat providers.
    /// *   `GROKAI_API_KEY`: Key for the vision and Grok chat routes. Falls back to `XAI_API_KEY`.
    /// *   `ELEVENLABS_API_KEY`, `ELEVENLABS_VOICE_ID`: Speech synthesis.
    /// *   `XAI_BASE_URL`, `OPENAI_BASE_URL`, `ELEVENLABS_BASE_URL`: (Optional) Upstream overrides.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let secret = |name: &str| var(name).map(SecretString::from);

        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let provider_str = var("LLM_PROVIDER").unwrap_or_else(|| "xai".to_string());
        let llm_provider = match provider_str.to_lowercase().as_str() {
            "xai" => LlmProvider::Xai,
            "openai" => LlmProvider::OpenAi,
            other => {
                return Err(ConfigError::InvalidValue(
                    "LLM_PROVIDER".to_string(),
                    format!("'{other}' is not one of 'xai' or 'openai'"),
                ));
            }
        };

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            llm_provider,
            openai_api_key: secret("OPENAI_API_KEY"),
            xai_api_key: secret("XAI_API_KEY"),
            grokai_api_key: secret("GROKAI_API_KEY").or_else(|| secret("XAI_API_KEY")),
            elevenlabs_api_key: secret("ELEVENLABS_API_KEY"),
            elevenlabs_voice_id: var("ELEVENLABS_VOICE_ID")
                .unwrap_or_else(|| DEFAULT_ELEVENLABS_VOICE_ID.to_string()),
            xai_base_url: var("XAI_BASE_URL").unwrap_or_else(|| DEFAULT_XAI_BASE_URL.to_string()),
            openai_base_url: var("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            elevenlabs_base_url: var("ELEVENLABS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ELEVENLABS_BASE_URL.to_string()),
            log_level,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    pub(crate) fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn missing_keys_do_not_fail_startup() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.llm_provider, LlmProvider::Xai);
        assert!(config.openai_api_key.is_none());
        assert!(config.grokai_api_key.is_none());
        assert!(config.elevenlabs_api_key.is_none());
        assert_eq!(config.elevenlabs_voice_id, DEFAULT_ELEVENLABS_VOICE_ID);
        assert_eq!(config.xai_base_url, DEFAULT_XAI_BASE_URL);
    }

    #[test]
    fn grokai_key_falls_back_to_xai_key() {
        let config = load(&[("XAI_API_KEY", "xai-123")]).unwrap();
        assert_eq!(config.grokai_api_key.unwrap().expose_secret(), "xai-123");

        let config = load(&[("XAI_API_KEY", "xai-123"), ("GROKAI_API_KEY", "grok-456")]).unwrap();
        assert_eq!(config.grokai_api_key.unwrap().expose_secret(), "grok-456");
    }

    #[test]
    fn provider_switch_is_case_insensitive() {
        let config = load(&[("LLM_PROVIDER", "OpenAI")]).unwrap();
        assert_eq!(config.llm_provider, LlmProvider::OpenAi);
        assert!(load(&[("LLM_PROVIDER", "claude")]).is_err());
    }

    #[test]
    fn rejects_bad_bind_address() {
        let err = load(&[("BIND_ADDRESS", "localhost")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "BIND_ADDRESS"));
    }
}
