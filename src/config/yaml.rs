use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// gemini:
///   api_key: "your-gemini-key"
///   host: "generativelanguage.googleapis.com"
///   api_version: "v1alpha"
///   # endpoint: "ws://127.0.0.1:9000/ws"   # full URL override
///   allow_insecure: false
///
/// session:
///   model: "models/gemini-2.0-flash-live-001"
///   voice: "Puck"
///   language_code: "en-IN"
///   system_instruction: "You are an interviewer."
///   response_modalities: ["AUDIO"]
///   input_transcription: true
///   output_transcription: true
///   auto_setup: true
///   connect_timeout_ms: 5000
///   tools:
///     - functionDeclarations:
///         - name: "get_time"
///           description: "Current time"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub gemini: Option<GeminiYaml>,
    pub session: Option<SessionYaml>,
}

/// Connection settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeminiYaml {
    pub api_key: Option<String>,
    pub host: Option<String>,
    pub api_version: Option<String>,
    pub endpoint: Option<String>,
    pub allow_insecure: Option<bool>,
}

/// Session settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub model: Option<String>,
    pub voice: Option<String>,
    pub language_code: Option<String>,
    pub system_instruction: Option<String>,
    pub response_modalities: Option<Vec<String>>,
    pub input_transcription: Option<bool>,
    pub output_transcription: Option<bool>,
    pub auto_setup: Option<bool>,
    pub connect_timeout_ms: Option<u64>,
    pub tools: Option<Vec<serde_json::Value>>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
