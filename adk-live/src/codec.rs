//! Outgoing message model and its wire encoding.
//!
//! Every [`OutgoingMessage`] variant maps to exactly one JSON envelope sent as
//! a text frame. Encoding is pure: no state, no I/O.

use crate::audio::PCM_MIME_TYPE;
use crate::config::{GenerationParams, LiveConfig, ToolDefinition};
use crate::error::{LiveError, Result};
use base64::Engine;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value, json};

/// An intent sent from the client to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingMessage {
    /// A user text turn.
    TextTurn {
        /// Turn text.
        text: String,
        /// Whether the turn is complete; omitted from the wire when `None`.
        turn_complete: Option<bool>,
    },
    /// A chunk of microphone PCM.
    AudioChunk {
        /// Raw PCM bytes, base64-encoded on the wire.
        pcm: Bytes,
        /// MIME type of the chunk.
        mime_type: String,
    },
    /// Result of a tool invocation requested by the server.
    ToolResult {
        /// The `id` of the originating function call.
        call_id: String,
        /// Tool output, or an error description.
        result: std::result::Result<Value, String>,
    },
    /// Mid-session generation config change.
    ConfigUpdate {
        /// New response modalities.
        modalities: Option<Vec<String>>,
        /// New sampling parameters.
        generation: Option<GenerationParams>,
    },
    /// Marks the end of the user's turn.
    EndOfTurn,
    /// Asks the server to stop the current response.
    Interrupt,
}

impl OutgoingMessage {
    /// A complete user text turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextTurn { text: text.into(), turn_complete: Some(true) }
    }

    /// A PCM audio chunk with the default MIME type.
    pub fn audio(pcm: impl Into<Bytes>) -> Self {
        Self::AudioChunk { pcm: pcm.into(), mime_type: PCM_MIME_TYPE.to_string() }
    }

    /// A successful tool result.
    pub fn tool_result(call_id: impl Into<String>, output: Value) -> Self {
        Self::ToolResult { call_id: call_id.into(), result: Ok(output) }
    }

    /// A failed tool result.
    pub fn tool_error(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ToolResult { call_id: call_id.into(), result: Err(error.into()) }
    }

    /// Short variant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextTurn { .. } => "text_turn",
            Self::AudioChunk { .. } => "audio_chunk",
            Self::ToolResult { .. } => "tool_result",
            Self::ConfigUpdate { .. } => "config_update",
            Self::EndOfTurn => "end_of_turn",
            Self::Interrupt => "interrupt",
        }
    }

    /// Whether sending this message hands the turn to the model.
    pub fn ends_turn(&self) -> bool {
        matches!(self, Self::EndOfTurn | Self::TextTurn { turn_complete: Some(true), .. })
    }
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct ClientEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    client_content: Option<ClientContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    realtime_input: Option<RealtimeInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_response: Option<ToolResponse>,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct ClientContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    turns: Option<Vec<Turn>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    turn_complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interrupt: Option<bool>,
}

#[derive(Debug, Serialize)]
struct Turn {
    role: &'static str,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput {
    media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaChunk {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolResponse {
    function_responses: Vec<FunctionResponse>,
}

#[derive(Debug, Serialize)]
struct FunctionResponse {
    id: String,
    response: Value,
}

/// Encode an outgoing message into its text-frame JSON envelope.
pub fn encode(message: &OutgoingMessage) -> Result<String> {
    let envelope = match message {
        OutgoingMessage::TextTurn { text, turn_complete } => ClientEnvelope {
            client_content: Some(ClientContent {
                turns: Some(vec![Turn {
                    role: "user",
                    parts: vec![TextPart { text: text.clone() }],
                }]),
                turn_complete: *turn_complete,
                ..Default::default()
            }),
            ..Default::default()
        },
        OutgoingMessage::AudioChunk { pcm, mime_type } => {
            if mime_type.trim().is_empty() {
                return Err(LiveError::format("audio chunk has an empty MIME type"));
            }
            ClientEnvelope {
                realtime_input: Some(RealtimeInput {
                    media_chunks: vec![MediaChunk {
                        mime_type: mime_type.clone(),
                        data: base64::engine::general_purpose::STANDARD.encode(pcm),
                    }],
                }),
                ..Default::default()
            }
        }
        OutgoingMessage::ToolResult { call_id, result } => {
            if call_id.trim().is_empty() {
                return Err(LiveError::format("tool result has an empty call id"));
            }
            let response = match result {
                Ok(Value::Object(map)) => Value::Object(map.clone()),
                Ok(other) => json!({ "result": other }),
                Err(error) => json!({ "error": error }),
            };
            ClientEnvelope {
                tool_response: Some(ToolResponse {
                    function_responses: vec![FunctionResponse { id: call_id.clone(), response }],
                }),
                ..Default::default()
            }
        }
        OutgoingMessage::ConfigUpdate { modalities, generation } => {
            let mut config = Map::new();
            if let Some(modalities) = modalities {
                config.insert("response_modalities".to_string(), json!(modalities));
            }
            if let Some(generation) = generation.as_ref().filter(|g| !g.is_empty()) {
                if let Value::Object(params) = serde_json::to_value(generation)? {
                    config.extend(params);
                }
            }
            if config.is_empty() {
                return Err(LiveError::format("config update carries no fields"));
            }
            ClientEnvelope {
                client_content: Some(ClientContent {
                    generation_config: Some(Value::Object(config)),
                    ..Default::default()
                }),
                ..Default::default()
            }
        }
        OutgoingMessage::EndOfTurn => ClientEnvelope {
            client_content: Some(ClientContent { turn_complete: Some(true), ..Default::default() }),
            ..Default::default()
        },
        OutgoingMessage::Interrupt => ClientEnvelope {
            client_content: Some(ClientContent { interrupt: Some(true), ..Default::default() }),
            ..Default::default()
        },
    };

    serde_json::to_string(&envelope)
        .map_err(|e| LiveError::format(format!("JSON serialize error: {}", e)))
}

/// Encode the one-time setup frame sent right after the transport opens.
pub fn encode_setup(config: &LiveConfig) -> Result<String> {
    if config.model.trim().is_empty() {
        return Err(LiveError::format("setup requires a model name"));
    }

    let mut setup = Map::new();
    setup.insert("model".to_string(), json!(config.model));

    let mut generation_config = Map::new();
    if !config.modalities.is_empty() {
        generation_config.insert("responseModalities".to_string(), json!(config.modalities));
    }
    if let Some(voice) = &config.voice {
        generation_config.insert(
            "speechConfig".to_string(),
            json!({ "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } } }),
        );
    }
    if !config.generation.is_empty() {
        if let Value::Object(params) = serde_json::to_value(&config.generation)? {
            generation_config.extend(params);
        }
    }
    if !generation_config.is_empty() {
        setup.insert("generationConfig".to_string(), Value::Object(generation_config));
    }

    if let Some(instruction) = &config.instruction {
        setup.insert(
            "systemInstruction".to_string(),
            json!({ "parts": [{ "text": instruction }] }),
        );
    }

    if let Some(tools) = convert_tools(&config.tools) {
        setup.insert("tools".to_string(), Value::Array(tools));
    }

    if config.input_transcription {
        setup.insert("input_audio_transcription".to_string(), json!({}));
    }
    if config.output_transcription {
        setup.insert("output_audio_transcription".to_string(), json!({}));
    }

    if let Some(handle) = &config.resumption_handle {
        setup.insert("sessionResumption".to_string(), json!({ "handle": handle }));
    }

    serde_json::to_string(&json!({ "setup": setup }))
        .map_err(|e| LiveError::format(format!("Serialize error: {}", e)))
}

fn convert_tools(tools: &[ToolDefinition]) -> Option<Vec<Value>> {
    if tools.is_empty() {
        return None;
    }

    let function_declarations: Vec<Value> = tools
        .iter()
        .map(|t| {
            let parameters = t
                .parameters
                .clone()
                .unwrap_or_else(|| json!({ "type": "object", "properties": {} }));
            json!({
                "name": t.name,
                "description": t.description.clone().unwrap_or_default(),
                "parameters": parameters
            })
        })
        .collect();

    Some(vec![json!({ "functionDeclarations": function_declarations })])
}
