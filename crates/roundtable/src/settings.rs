//! Environment backed settings.
//!
//! Values come from (lowest to highest priority) the built-in defaults, a `.env`
//! file in the working directory and `ROUNDTABLE_*` environment variables. Nested
//! keys use a double underscore, e.g. `ROUNDTABLE_LLM__API_KEY`.

use config::{Config, Environment as EnvironmentSource};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::providers::configs::{OllamaProviderConfig, OpenAiProviderConfig, ProviderConfig};
use crate::providers::ollama::OLLAMA_HOST;

pub const ENV_PREFIX: &str = "ROUNDTABLE";
const OLLAMA_MODEL_PREFIX: &str = "ollama/";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Translate a dotted settings key into the environment variable that sets it
pub fn to_env_var(field: &str) -> String {
    format!("{}_{}", ENV_PREFIX, field.replace('.', "__").to_uppercase())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Staging,
    Production,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(try_from = "String")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl TryFrom<String> for LogLevel {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, strum::ParseError> {
        value.trim().parse()
    }
}

/// Which model an agent is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    General,
    Code,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub code_model: Option<String>,
    pub base_url: String,
    pub api_key: Option<String>,
    pub ollama_host: String,
    pub chat_length: usize,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "ollama/mistral:7b-instruct-v0.2-q8_0".to_string(),
            code_model: None,
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            ollama_host: OLLAMA_HOST.to_string(),
            chat_length: 8000,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub search_api_key: Option<String>,
    pub max_search_results: usize,
    pub code_execution_in_docker: bool,
    pub docker_image: String,
    pub python: String,
    pub working_dir: Option<PathBuf>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            search_api_key: None,
            max_search_results: 5,
            code_execution_in_docker: false,
            docker_image: "python:3.11-slim".to_string(),
            python: "python3".to_string(),
            working_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    pub recursion_limit: usize,
    pub max_agent_iterations: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            recursion_limit: 100,
            max_agent_iterations: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub title: String,
    pub description: String,
    pub version: String,
    pub environment: Environment,
    pub log_level: LogLevel,
    pub llm: LlmSettings,
    pub tools: ToolSettings,
    pub room: RoomSettings,
    pub server: ServerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            title: "Roundtable".to_string(),
            description: "This is a tool that simulates a roundtable discussion using AI agents."
                .to_string(),
            version: "0.1.0".to_string(),
            environment: Environment::default(),
            log_level: LogLevel::default(),
            llm: LlmSettings::default(),
            tools: ToolSettings::default(),
            room: RoomSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Settings {
    /// Load `.env` (if present) and then read the environment
    pub fn new() -> Result<Self, ConfigError> {
        if let Err(e) = dotenv::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }
        Self::load()
    }

    /// Read the environment only
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                EnvironmentSource::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            match &err {
                config::ConfigError::NotFound(field) => ConfigError::MissingEnvVar {
                    env_var: to_env_var(field),
                },
                _ => ConfigError::Other(err),
            }
        })
    }

    pub fn project_name(&self) -> &str {
        &self.title
    }

    pub fn is_production_environment(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.log_level == LogLevel::Debug
    }

    pub fn llm_model(&self) -> &str {
        &self.llm.model
    }

    pub fn llm_chat_length(&self) -> usize {
        self.llm.chat_length
    }

    /// The model used by coding agents, falling back to the general model
    pub fn code_model(&self) -> &str {
        self.llm.code_model.as_deref().unwrap_or(&self.llm.model)
    }

    /// Build the provider configuration for agents playing the given role.
    ///
    /// An `ollama/` model prefix selects the local Ollama provider; any other model
    /// goes to the OpenAI compatible endpoint at `llm.base_url`.
    pub fn provider_config(&self, role: ModelRole) -> Result<ProviderConfig, ConfigError> {
        let model = match role {
            ModelRole::General => self.llm_model(),
            ModelRole::Code => self.code_model(),
        };

        if let Some(ollama_model) = model.strip_prefix(OLLAMA_MODEL_PREFIX) {
            return Ok(ProviderConfig::Ollama(OllamaProviderConfig {
                host: self.llm.ollama_host.clone(),
                model: ollama_model.to_string(),
                temperature: self.llm.temperature,
                max_tokens: self.llm.max_tokens,
            }));
        }

        let api_key = self
            .llm
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar {
                env_var: to_env_var("llm.api_key"),
            })?;

        Ok(ProviderConfig::OpenAi(OpenAiProviderConfig {
            host: self.llm.base_url.clone(),
            api_key,
            model: model.to_string(),
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("ROUNDTABLE_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();

        let settings = Settings::load().unwrap();
        assert_eq!(settings.project_name(), "Roundtable");
        assert_eq!(settings.version, "0.1.0");
        assert_eq!(settings.environment, Environment::Development);
        assert!(settings.is_debug_enabled());
        assert!(!settings.is_production_environment());
        assert_eq!(settings.llm_model(), "ollama/mistral:7b-instruct-v0.2-q8_0");
        assert_eq!(settings.llm_chat_length(), 8000);
        assert_eq!(settings.tools.max_search_results, 5);
        assert!(!settings.tools.code_execution_in_docker);
        assert_eq!(settings.room.recursion_limit, 100);
        assert_eq!(settings.server.port, 3000);
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("ROUNDTABLE_ENVIRONMENT", "production");
        env::set_var("ROUNDTABLE_LOG_LEVEL", "WARNING");
        env::set_var("ROUNDTABLE_LLM__MODEL", "gpt-4o");
        env::set_var("ROUNDTABLE_LLM__API_KEY", "test-key");
        env::set_var("ROUNDTABLE_LLM__TEMPERATURE", "0.2");
        env::set_var("ROUNDTABLE_TOOLS__CODE_EXECUTION_IN_DOCKER", "true");
        env::set_var("ROUNDTABLE_SERVER__PORT", "8080");

        let settings = Settings::load().unwrap();
        assert!(settings.is_production_environment());
        assert_eq!(settings.log_level, LogLevel::Warning);
        assert!(!settings.is_debug_enabled());
        assert_eq!(settings.llm_model(), "gpt-4o");
        assert_eq!(settings.llm.temperature, Some(0.2));
        assert!(settings.tools.code_execution_in_docker);
        assert_eq!(settings.server.port, 8080);

        clean_env();
    }

    #[test]
    #[serial]
    fn test_unknown_log_level_is_rejected() {
        clean_env();
        env::set_var("ROUNDTABLE_LOG_LEVEL", "verbose");

        let result = Settings::load();
        assert!(matches!(result, Err(ConfigError::Other(_))));

        clean_env();
    }

    #[test]
    fn test_log_level_from_string() {
        assert_eq!(LogLevel::try_from(" Error ".to_string()), Ok(LogLevel::Error));
        assert_eq!(LogLevel::try_from("critical".to_string()), Ok(LogLevel::Critical));
        assert_eq!(
            LogLevel::try_from("verbose".to_string()),
            Err(strum::ParseError::VariantNotFound)
        );
    }

    #[test]
    fn test_ollama_prefix_selects_ollama() {
        let settings = Settings::default();
        match settings.provider_config(ModelRole::General).unwrap() {
            ProviderConfig::Ollama(config) => {
                assert_eq!(config.model, "mistral:7b-instruct-v0.2-q8_0");
                assert_eq!(config.host, OLLAMA_HOST);
            }
            _ => panic!("Expected Ollama provider"),
        }
    }

    #[test]
    fn test_openai_requires_api_key() {
        let mut settings = Settings::default();
        settings.llm.model = "gpt-4o".to_string();

        match settings.provider_config(ModelRole::General) {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert_eq!(env_var, "ROUNDTABLE_LLM__API_KEY")
            }
            _ => panic!("Expected a missing api key"),
        }

        settings.llm.api_key = Some("key".to_string());
        settings.llm.code_model = Some("gpt-4o-mini".to_string());
        match settings.provider_config(ModelRole::Code).unwrap() {
            ProviderConfig::OpenAi(config) => {
                assert_eq!(config.model, "gpt-4o-mini");
                assert_eq!(config.host, "https://api.openai.com");
            }
            _ => panic!("Expected OpenAI provider"),
        }
    }

    #[test]
    fn test_socket_addr_conversion() {
        let addr = ServerSettings::default().socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("tools.search_api_key"), "ROUNDTABLE_TOOLS__SEARCH_API_KEY");
    }
}
