//! Configuration types for live sessions.

use crate::error::{LiveError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Default Live API WebSocket endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default Live model.
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-live-001";

/// Default bound on the wait for `setupComplete`.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of chunks buffered before playback starts.
pub const DEFAULT_PRE_BUFFER_CHUNKS: usize = 4;

/// Sampling parameters forwarded inside `generationConfig`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl GenerationParams {
    /// Whether no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.top_k.is_none()
            && self.max_output_tokens.is_none()
    }
}

/// Tool/function definition advertised during setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), description: None, parameters: None }
    }

    /// Set the tool description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the parameters schema.
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = Some(schema);
        self
    }
}

/// Configuration for a live session.
///
/// The API key is held as a [`SecretString`]; it is never serialized and is
/// redacted from `Debug` output.
#[derive(Debug, Serialize, Deserialize)]
pub struct LiveConfig {
    /// API key appended to the connection URL.
    #[serde(skip)]
    pub api_key: Option<SecretString>,

    /// Socket endpoint (without the key parameter).
    pub endpoint: String,

    /// Model name sent in the setup frame.
    pub model: String,

    /// System instruction for the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,

    /// Prebuilt voice name for audio output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Response modalities, e.g. `["AUDIO"]` or `["TEXT"]`.
    pub modalities: Vec<String>,

    /// Sampling parameters.
    #[serde(default)]
    pub generation: GenerationParams,

    /// Available tools/functions.
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,

    /// Ask the server to transcribe microphone audio.
    #[serde(default)]
    pub input_transcription: bool,

    /// Ask the server to transcribe its own audio output.
    #[serde(default)]
    pub output_transcription: bool,

    /// Handle from a previous `sessionResumptionUpdate`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumption_handle: Option<String>,

    /// Bound on the wait for `setupComplete`.
    pub handshake_timeout: Duration,

    /// Chunks buffered before playback starts automatically.
    pub pre_buffer_chunks: usize,
}

impl Clone for LiveConfig {
    fn clone(&self) -> Self {
        Self {
            api_key: self
                .api_key
                .as_ref()
                .map(|k| SecretString::from(k.expose_secret().to_owned())),
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            instruction: self.instruction.clone(),
            voice: self.voice.clone(),
            modalities: self.modalities.clone(),
            generation: self.generation.clone(),
            tools: self.tools.clone(),
            input_transcription: self.input_transcription,
            output_transcription: self.output_transcription,
            resumption_handle: self.resumption_handle.clone(),
            handshake_timeout: self.handshake_timeout,
            pre_buffer_chunks: self.pre_buffer_chunks,
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            instruction: None,
            voice: None,
            modalities: vec!["AUDIO".to_string()],
            generation: GenerationParams::default(),
            tools: Vec::new(),
            input_transcription: false,
            output_transcription: false,
            resumption_handle: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            pre_buffer_chunks: DEFAULT_PRE_BUFFER_CHUNKS,
        }
    }
}

impl LiveConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the key and optional model/endpoint overrides from the environment.
    ///
    /// Reads `GEMINI_API_KEY` (falling back to `GOOGLE_API_KEY`),
    /// `GEMINI_LIVE_MODEL` and `GEMINI_LIVE_ENDPOINT`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| LiveError::config("GEMINI_API_KEY or GOOGLE_API_KEY must be set"))?;

        let mut config = Self::default().with_api_key(api_key);
        if let Ok(model) = std::env::var("GEMINI_LIVE_MODEL") {
            config.model = model;
        }
        if let Ok(endpoint) = std::env::var("GEMINI_LIVE_ENDPOINT") {
            config.endpoint = endpoint;
        }
        Ok(config)
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Set the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the system instruction.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Set the voice.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Set response modalities.
    pub fn with_modalities(mut self, modalities: Vec<String>) -> Self {
        self.modalities = modalities;
        self
    }

    /// Text-only responses.
    pub fn with_text_only(self) -> Self {
        self.with_modalities(vec!["TEXT".to_string()])
    }

    /// Set temperature.
    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.generation.temperature = Some(temp);
        self
    }

    /// Replace all sampling parameters.
    pub fn with_generation(mut self, generation: GenerationParams) -> Self {
        self.generation = generation;
        self
    }

    /// Add a tool definition.
    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    /// Enable input and output transcription.
    pub fn with_transcription(mut self) -> Self {
        self.input_transcription = true;
        self.output_transcription = true;
        self
    }

    /// Resume a previous session.
    pub fn with_resumption_handle(mut self, handle: impl Into<String>) -> Self {
        self.resumption_handle = Some(handle.into());
        self
    }

    /// Set the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the playback pre-buffer threshold.
    pub fn with_pre_buffer_chunks(mut self, chunks: usize) -> Self {
        self.pre_buffer_chunks = chunks;
        self
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(LiveError::config("model must not be empty"));
        }
        if self.pre_buffer_chunks == 0 {
            return Err(LiveError::config("pre_buffer_chunks must be at least 1"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(LiveError::config("handshake_timeout must be non-zero"));
        }
        Ok(())
    }

    /// Build the socket URL, including the `key` query parameter.
    pub fn connection_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            LiveError::config(format!("invalid endpoint '{}': {}", self.endpoint, e))
        })?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(LiveError::config(format!(
                "endpoint scheme must be ws or wss, got '{}'",
                url.scheme()
            )));
        }

        let key = self
            .api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LiveError::config("API key is not set"))?;

        url.query_pairs_mut().append_pair("key", key);
        Ok(url)
    }
}
