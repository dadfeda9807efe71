//! Configuration module for waav-live
//!
//! This module handles session configuration from .env files, YAML files and
//! environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//!
//! # Example
//! ```rust,no_run
//! use waav_live::config::LiveConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = LiveConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = LiveConfig::from_file(&config_path)?;
//!
//! println!("Connecting to {}", config.display_endpoint());
//! # Ok(())
//! # }
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::core::live::config::{
    DEFAULT_LANGUAGE_CODE, DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_VOICE,
    GEMINI_LIVE_API_VERSION, GEMINI_LIVE_HOST, GeminiVoice, live_endpoint,
};
use crate::core::live::messages::{Modality, SetupCommand};
use crate::core::live::{LiveError, LiveResult, SessionOptions, WebSocketConnector};
use crate::utils::{EndpointValidationError, redact_api_key, validate_live_endpoint, with_api_key};

mod yaml;

pub use yaml::{GeminiYaml, SessionYaml, YamlConfig};

/// Default readiness wait in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Live session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    /// Gemini API key, sent as the `key` query parameter
    pub api_key: Option<String>,
    /// API host used to build the endpoint
    pub host: String,
    /// API version segment used to build the endpoint
    pub api_version: String,
    /// Full endpoint URL; overrides `host` and `api_version`
    pub endpoint: Option<String>,
    /// Permit plain `ws://` endpoints
    pub allow_insecure: bool,

    pub model: String,
    pub voice: String,
    pub language_code: String,
    pub system_instruction: String,
    pub response_modalities: Vec<Modality>,
    pub input_transcription: bool,
    pub output_transcription: bool,
    /// Opaque tool declarations forwarded in the setup command
    pub tools: Vec<serde_json::Value>,

    /// Send setup as soon as the channel opens
    pub auto_setup: bool,
    /// Readiness wait budget in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            host: GEMINI_LIVE_HOST.to_string(),
            api_version: GEMINI_LIVE_API_VERSION.to_string(),
            endpoint: None,
            allow_insecure: false,
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            language_code: DEFAULT_LANGUAGE_CODE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            response_modalities: vec![Modality::Audio],
            input_transcription: true,
            output_transcription: true,
            tools: Vec::new(),
            auto_setup: true,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl LiveConfig {
    /// Load configuration from environment variables
    ///
    /// Reads `GEMINI_API_KEY` and the `GEMINI_LIVE_*` variables; anything unset
    /// keeps its default. The .env file is loaded by the binary at startup.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable fallback
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = Self::default();
        config.apply_env()?;
        config.apply_yaml(yaml_config)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), String> {
        if let Some(v) = env_string("GEMINI_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = env_string("GEMINI_LIVE_HOST") {
            self.host = v;
        }
        if let Some(v) = env_string("GEMINI_LIVE_API_VERSION") {
            self.api_version = v;
        }
        if let Some(v) = env_string("GEMINI_LIVE_ENDPOINT") {
            self.endpoint = Some(v);
        }
        if let Some(v) = env_bool("GEMINI_LIVE_ALLOW_INSECURE")? {
            self.allow_insecure = v;
        }
        if let Some(v) = env_string("GEMINI_LIVE_MODEL") {
            self.model = v;
        }
        if let Some(v) = env_string("GEMINI_LIVE_VOICE") {
            self.voice = v;
        }
        if let Some(v) = env_string("GEMINI_LIVE_LANGUAGE") {
            self.language_code = v;
        }
        if let Some(v) = env_string("GEMINI_LIVE_SYSTEM_INSTRUCTION") {
            self.system_instruction = v;
        }
        if let Some(v) = env_string("GEMINI_LIVE_MODALITIES") {
            let items: Vec<String> = v.split(',').map(str::to_string).collect();
            self.response_modalities = parse_modalities(&items)?;
        }
        if let Some(v) = env_bool("GEMINI_LIVE_INPUT_TRANSCRIPTION")? {
            self.input_transcription = v;
        }
        if let Some(v) = env_bool("GEMINI_LIVE_OUTPUT_TRANSCRIPTION")? {
            self.output_transcription = v;
        }
        if let Some(v) = env_bool("GEMINI_LIVE_AUTO_SETUP")? {
            self.auto_setup = v;
        }
        if let Some(v) = env_string("GEMINI_LIVE_CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = v
                .parse()
                .map_err(|e| format!("Invalid GEMINI_LIVE_CONNECT_TIMEOUT_MS '{v}': {e}"))?;
        }
        Ok(())
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) -> Result<(), String> {
        if let Some(gemini) = yaml.gemini {
            if let Some(v) = gemini.api_key {
                self.api_key = Some(v);
            }
            if let Some(v) = gemini.host {
                self.host = v;
            }
            if let Some(v) = gemini.api_version {
                self.api_version = v;
            }
            if let Some(v) = gemini.endpoint {
                self.endpoint = Some(v);
            }
            if let Some(v) = gemini.allow_insecure {
                self.allow_insecure = v;
            }
        }

        if let Some(session) = yaml.session {
            if let Some(v) = session.model {
                self.model = v;
            }
            if let Some(v) = session.voice {
                self.voice = v;
            }
            if let Some(v) = session.language_code {
                self.language_code = v;
            }
            if let Some(v) = session.system_instruction {
                self.system_instruction = v;
            }
            if let Some(v) = session.response_modalities {
                self.response_modalities = parse_modalities(&v)?;
            }
            if let Some(v) = session.input_transcription {
                self.input_transcription = v;
            }
            if let Some(v) = session.output_transcription {
                self.output_transcription = v;
            }
            if let Some(v) = session.auto_setup {
                self.auto_setup = v;
            }
            if let Some(v) = session.connect_timeout_ms {
                self.connect_timeout_ms = v;
            }
            if let Some(v) = session.tools {
                self.tools = v;
            }
        }
        Ok(())
    }

    /// Check the merged configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model must not be empty".to_string());
        }
        if self.response_modalities.is_empty() {
            return Err("At least one response modality is required".to_string());
        }
        if self.connect_timeout_ms == 0 {
            return Err("Connect timeout must be greater than zero".to_string());
        }
        if GeminiVoice::from_name(&self.voice).is_none() {
            warn!(voice = %self.voice, "Unknown voice, passing it through unchanged");
        }
        if self.api_key.is_none() && self.endpoint.is_none() {
            warn!("GEMINI_API_KEY is not set; the Live API will reject the connection");
        }
        self.endpoint_url()
            .map(|_| ())
            .map_err(|e| format!("Invalid Live API endpoint: {e}"))
    }

    /// The endpoint URL to connect to, including the API key when set
    pub fn endpoint_url(&self) -> Result<String, EndpointValidationError> {
        let base = self
            .endpoint
            .clone()
            .unwrap_or_else(|| live_endpoint(&self.host, &self.api_version));
        let url = validate_live_endpoint(&base, self.allow_insecure)?;
        let url = match &self.api_key {
            Some(key) => with_api_key(url, key),
            None => url,
        };
        Ok(url.to_string())
    }

    /// The endpoint URL with the API key masked, for display
    pub fn display_endpoint(&self) -> String {
        match self.endpoint_url() {
            Ok(url) => redact_api_key(&url),
            Err(e) => format!("<invalid endpoint: {e}>"),
        }
    }

    /// The setup command described by this configuration
    pub fn setup_command(&self) -> SetupCommand {
        let mut setup = SetupCommand::new(&self.model)
            .with_modalities(self.response_modalities.clone())
            .with_voice(&self.voice)
            .with_language(&self.language_code)
            .with_input_transcription(self.input_transcription)
            .with_output_transcription(self.output_transcription)
            .with_tools(self.tools.clone());
        if !self.system_instruction.trim().is_empty() {
            setup = setup.with_system_instruction(&self.system_instruction);
        }
        setup
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            auto_setup: self.auto_setup,
            setup: Some(self.setup_command()),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// WebSocket connector for the configured endpoint
    pub fn connector(&self) -> LiveResult<WebSocketConnector> {
        let url = self
            .endpoint_url()
            .map_err(|e| LiveError::InvalidConfiguration(e.to_string()))?;
        Ok(WebSocketConnector::new(url))
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(name: &str) -> Result<Option<bool>, String> {
    match env_string(name) {
        None => Ok(None),
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("Invalid boolean for {name}: '{v}'")),
        },
    }
}

fn parse_modalities(items: &[String]) -> Result<Vec<Modality>, String> {
    items
        .iter()
        .filter(|item| !item.trim().is_empty())
        .map(|item| {
            Modality::parse(item).ok_or_else(|| format!("Unknown response modality '{item}'"))
        })
        .collect()
}
