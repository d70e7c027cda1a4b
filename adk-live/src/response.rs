//! Inbound frame parsing.
//!
//! [`parse`] turns one transport frame into an [`IncomingResponse`]. The
//! variant is picked by the first matching top-level key, checked in this
//! order: `setupComplete`, `serverContent`, `toolCall`, `toolCallCancellation`,
//! `error`, `sessionResumptionUpdate`, `goAway`. Objects with none of them
//! parse to [`IncomingResponse::Unknown`].
//!
//! `usageMetadata` can ride along at the top level or inside `serverContent`;
//! it is returned next to the primary variant in [`ParsedFrame::usage`].

use crate::error::{LiveError, Result};
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A raw frame as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
}

impl Frame {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Model output carried by a `serverContent` frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerContent {
    /// Text parts of the model turn, in order.
    pub text_parts: Vec<String>,
    /// Decoded inline audio parts, in order.
    pub audio_parts: Vec<Bytes>,
    /// The model finished its turn.
    pub turn_complete: bool,
    /// The model turn was cut off by user activity.
    pub interrupted: bool,
    /// The model finished generating (playback may still be pending).
    pub generation_complete: bool,
    /// Transcript of the user's audio.
    pub input_transcript: Option<String>,
    /// Transcript of the model's audio.
    pub output_transcript: Option<String>,
}

impl ServerContent {
    /// All text parts joined with a single space and trimmed.
    ///
    /// Returns `None` when there is no visible text.
    pub fn joined_text(&self) -> Option<String> {
        let joined = self.text_parts.join(" ");
        let trimmed = joined.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    }
}

/// A single function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Call id, echoed back in the tool result.
    pub id: String,
    /// Function name.
    pub name: String,
    /// Arguments object.
    pub args: Value,
}

/// Error reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorInfo {
    /// Numeric code, if present.
    pub code: Option<i64>,
    /// Human-readable message.
    pub message: String,
    /// Status string, if present.
    pub status: Option<String>,
}

impl From<ApiErrorInfo> for LiveError {
    fn from(info: ApiErrorInfo) -> Self {
        LiveError::Api { code: info.code, message: info.message, status: info.status }
    }
}

/// Token accounting reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    /// Tokens in the prompt.
    pub prompt_tokens: u64,
    /// Tokens in the generated candidates.
    pub candidate_tokens: u64,
    /// Total tokens.
    pub total_tokens: u64,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingResponse {
    /// Handshake finished.
    SetupComplete,
    /// Model output.
    ServerContent(ServerContent),
    /// The model wants one or more tools run.
    ToolCall {
        /// Requested calls, in order.
        calls: Vec<FunctionCall>,
    },
    /// Previously requested calls are no longer needed.
    ToolCallCancellation {
        /// Ids of the cancelled calls.
        ids: Vec<String>,
    },
    /// Raw PCM delivered as a binary frame.
    BinaryAudio(Bytes),
    /// The server reported an error.
    ApiError(ApiErrorInfo),
    /// New resumption state for this session.
    SessionResumptionUpdate {
        /// Handle to resume with, if the server issued one.
        handle: Option<String>,
        /// Whether the session can currently be resumed.
        resumable: bool,
    },
    /// The server will close the connection soon.
    GoAway {
        /// Time left before the server disconnects.
        time_left: Option<Duration>,
    },
    /// Frame carrying only usage accounting.
    UsageMetadata(UsageMetadata),
    /// Unrecognized frame.
    Unknown,
}

impl IncomingResponse {
    /// Short variant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetupComplete => "setup_complete",
            Self::ServerContent(_) => "server_content",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolCallCancellation { .. } => "tool_call_cancellation",
            Self::BinaryAudio(_) => "binary_audio",
            Self::ApiError(_) => "error",
            Self::SessionResumptionUpdate { .. } => "session_resumption_update",
            Self::GoAway { .. } => "go_away",
            Self::UsageMetadata(_) => "usage_metadata",
            Self::Unknown => "unknown",
        }
    }
}

/// Result of parsing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    /// Primary response variant.
    pub response: IncomingResponse,
    /// Usage metadata found at the top level or inside `serverContent`.
    pub usage: Option<UsageMetadata>,
}

impl ParsedFrame {
    fn bare(response: IncomingResponse) -> Self {
        Self { response, usage: None }
    }
}

/// Parse one transport frame.
///
/// Text frames must hold valid JSON; malformed JSON is a
/// [`LiveError::MessageFormat`]. Binary frames that decode as a UTF-8 JSON
/// object take the JSON path, anything else is raw PCM.
pub fn parse(frame: &Frame) -> Result<ParsedFrame> {
    match frame {
        Frame::Text(text) => {
            let value: Value = serde_json::from_str(text)
                .map_err(|e| LiveError::format(format!("Parse error: {}", e)))?;
            Ok(parse_value(&value))
        }
        Frame::Binary(bytes) => {
            let json = std::str::from_utf8(bytes)
                .ok()
                .and_then(|text| serde_json::from_str::<Value>(text).ok())
                .filter(Value::is_object);
            match json {
                Some(value) => Ok(parse_value(&value)),
                None => Ok(ParsedFrame::bare(IncomingResponse::BinaryAudio(bytes.clone()))),
            }
        }
    }
}

/// Parse an already-decoded JSON frame. Never fails.
pub fn parse_value(value: &Value) -> ParsedFrame {
    let usage = extract_usage(value);

    let response = if value.get("setupComplete").is_some() {
        IncomingResponse::SetupComplete
    } else if let Some(content) = value.get("serverContent") {
        IncomingResponse::ServerContent(parse_server_content(content))
    } else if let Some(tool_call) = value.get("toolCall") {
        IncomingResponse::ToolCall { calls: parse_function_calls(tool_call) }
    } else if let Some(cancellation) = value.get("toolCallCancellation") {
        IncomingResponse::ToolCallCancellation { ids: string_array(cancellation.get("ids")) }
    } else if let Some(error) = value.get("error") {
        IncomingResponse::ApiError(parse_error(error))
    } else if let Some(update) = value.get("sessionResumptionUpdate") {
        IncomingResponse::SessionResumptionUpdate {
            handle: update
                .get("newHandle")
                .and_then(Value::as_str)
                .filter(|h| !h.is_empty())
                .map(str::to_string),
            resumable: update.get("resumable").and_then(Value::as_bool).unwrap_or(false),
        }
    } else if let Some(go_away) = value.get("goAway") {
        IncomingResponse::GoAway { time_left: go_away.get("timeLeft").and_then(parse_duration) }
    } else if let Some(usage) = usage {
        IncomingResponse::UsageMetadata(usage)
    } else {
        IncomingResponse::Unknown
    };

    ParsedFrame { response, usage }
}

/// Find usage metadata at the top level or nested in `serverContent`.
pub fn extract_usage(value: &Value) -> Option<UsageMetadata> {
    value
        .get("usageMetadata")
        .or_else(|| value.get("serverContent").and_then(|c| c.get("usageMetadata")))
        .filter(|u| u.is_object())
        .map(|usage| UsageMetadata {
            prompt_tokens: token_count(usage, &["promptTokenCount"]),
            candidate_tokens: token_count(usage, &["candidatesTokenCount", "responseTokenCount"]),
            total_tokens: token_count(usage, &["totalTokenCount"]),
        })
}

fn token_count(usage: &Value, keys: &[&str]) -> u64 {
    keys.iter().find_map(|k| usage.get(*k).and_then(Value::as_u64)).unwrap_or(0)
}

fn parse_server_content(content: &Value) -> ServerContent {
    let mut parsed = ServerContent {
        turn_complete: flag(content, "turnComplete"),
        interrupted: flag(content, "interrupted"),
        generation_complete: flag(content, "generationComplete"),
        input_transcript: transcript(content, "inputTranscription"),
        output_transcript: transcript(content, "outputTranscription"),
        ..Default::default()
    };

    let parts = content.get("modelTurn").and_then(|t| t.get("parts")).and_then(Value::as_array);
    for part in parts.into_iter().flatten() {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            parsed.text_parts.push(text.to_string());
        }
        let inline = part.get("inlineData").and_then(|d| d.get("data")).and_then(Value::as_str);
        if let Some(data) = inline {
            match base64::engine::general_purpose::STANDARD.decode(data) {
                Ok(decoded) => parsed.audio_parts.push(Bytes::from(decoded)),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping inline audio part with invalid base64")
                }
            }
        }
    }

    parsed
}

fn parse_function_calls(tool_call: &Value) -> Vec<FunctionCall> {
    tool_call
        .get("functionCalls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .map(|call| FunctionCall {
                    id: call.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                    name: call.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    args: call
                        .get("args")
                        .cloned()
                        .unwrap_or_else(|| Value::Object(Default::default())),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_error(error: &Value) -> ApiErrorInfo {
    let code = error.get("code").and_then(|c| {
        c.as_i64().or_else(|| c.as_str().and_then(|s| s.parse::<i64>().ok()))
    });
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| error.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown server error".to_string());
    let status = error.get("status").and_then(Value::as_str).map(str::to_string);
    ApiErrorInfo { code, message, status }
}

fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn transcript(content: &Value, key: &str) -> Option<String> {
    content.get(key).and_then(|t| t.get("text")).and_then(Value::as_str).map(str::to_string)
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Accepts protobuf JSON durations (`"1.5s"`) and `{seconds, nanos}` objects.
fn parse_duration(value: &Value) -> Option<Duration> {
    match value {
        Value::String(text) => {
            let secs: f64 = text.strip_suffix('s')?.parse().ok()?;
            (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
        }
        Value::Object(_) => {
            let seconds = value.get("seconds").and_then(|s| {
                s.as_u64().or_else(|| s.as_str().and_then(|t| t.parse().ok()))
            })?;
            let nanos = value.get("nanos").and_then(Value::as_u64).unwrap_or(0);
            Some(Duration::new(seconds, u32::try_from(nanos).ok()?))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_text(raw: &str) -> ParsedFrame {
        parse(&Frame::Text(raw.to_string())).unwrap()
    }

    #[test]
    fn test_setup_complete() {
        assert_eq!(parse_text(r#"{"setupComplete":{}}"#).response, IncomingResponse::SetupComplete);
    }

    #[test]
    fn test_server_content_text_and_flags() {
        let parsed = parse_text(
            r#"{"serverContent":{"modelTurn":{"parts":[{"text":" Hi"},{"text":"there "}]},"turnComplete":true}}"#,
        );
        match parsed.response {
            IncomingResponse::ServerContent(content) => {
                assert_eq!(content.text_parts.len(), 2);
                assert_eq!(content.joined_text().as_deref(), Some("Hi there"));
                assert!(content.turn_complete);
                assert!(!content.interrupted);
                assert!(content.audio_parts.is_empty());
            }
            other => panic!("Expected ServerContent, got {:?}", other),
        }
    }

    #[test]
    fn test_server_content_inline_audio_and_transcripts() {
        let raw = json!({
            "serverContent": {
                "modelTurn": { "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "aGVsbG8=" } },
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAE=" } }
                ]},
                "inputTranscription": { "text": "what time is it" },
                "outputTranscription": { "text": "it is noon" },
                "interrupted": true,
                "generationComplete": true
            }
        });
        match parse_value(&raw).response {
            IncomingResponse::ServerContent(content) => {
                assert_eq!(
                    content.audio_parts,
                    vec![Bytes::from_static(b"hello"), Bytes::from_static(&[0, 1])]
                );
                assert_eq!(content.input_transcript.as_deref(), Some("what time is it"));
                assert_eq!(content.output_transcript.as_deref(), Some("it is noon"));
                assert!(content.interrupted);
                assert!(content.generation_complete);
                assert_eq!(content.joined_text(), None);
            }
            other => panic!("Expected ServerContent, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_inline_audio_is_skipped() {
        let raw = json!({ "serverContent": { "modelTurn": { "parts": [
            { "inlineData": { "data": "***not base64***" } }
        ]}}});
        match parse_value(&raw).response {
            IncomingResponse::ServerContent(content) => assert!(content.audio_parts.is_empty()),
            other => panic!("Expected ServerContent, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_call_with_multiple_calls() {
        let raw = json!({ "toolCall": { "functionCalls": [
            { "id": "c1", "name": "get_weather", "args": { "city": "Nairobi" } },
            { "id": "c2", "name": "get_time" }
        ]}});
        match parse_value(&raw).response {
            IncomingResponse::ToolCall { calls } => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].name, "get_weather");
                assert_eq!(calls[0].args["city"], "Nairobi");
                assert_eq!(calls[1].id, "c2");
                assert_eq!(calls[1].args, json!({}));
            }
            other => panic!("Expected ToolCall, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_call_cancellation() {
        let parsed = parse_text(r#"{"toolCallCancellation":{"ids":["c1","c2"]}}"#);
        assert_eq!(
            parsed.response,
            IncomingResponse::ToolCallCancellation { ids: vec!["c1".into(), "c2".into()] }
        );
    }

    #[test]
    fn test_api_error() {
        let parsed = parse_text(
            r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#,
        );
        assert_eq!(
            parsed.response,
            IncomingResponse::ApiError(ApiErrorInfo {
                code: Some(429),
                message: "Quota exceeded".into(),
                status: Some("RESOURCE_EXHAUSTED".into()),
            })
        );
    }

    #[test]
    fn test_session_resumption_and_go_away() {
        let parsed =
            parse_text(r#"{"sessionResumptionUpdate":{"newHandle":"h-1","resumable":true}}"#);
        assert_eq!(
            parsed.response,
            IncomingResponse::SessionResumptionUpdate {
                handle: Some("h-1".into()),
                resumable: true
            }
        );

        let parsed = parse_text(r#"{"goAway":{"timeLeft":"1.5s"}}"#);
        assert_eq!(
            parsed.response,
            IncomingResponse::GoAway { time_left: Some(Duration::from_millis(1500)) }
        );

        let parsed = parse_text(r#"{"goAway":{}}"#);
        assert_eq!(parsed.response, IncomingResponse::GoAway { time_left: None });
    }

    #[test]
    fn test_key_precedence_is_fixed() {
        let parsed = parse_text(r#"{"goAway":{},"setupComplete":{},"toolCall":{}}"#);
        assert_eq!(parsed.response, IncomingResponse::SetupComplete);
    }

    #[test]
    fn test_usage_metadata_locations() {
        let top = parse_text(
            r#"{"serverContent":{"turnComplete":true},"usageMetadata":{"promptTokenCount":10,"candidatesTokenCount":5,"totalTokenCount":15}}"#,
        );
        assert!(matches!(top.response, IncomingResponse::ServerContent(_)));
        assert_eq!(
            top.usage,
            Some(UsageMetadata { prompt_tokens: 10, candidate_tokens: 5, total_tokens: 15 })
        );

        let nested = parse_text(
            r#"{"serverContent":{"usageMetadata":{"promptTokenCount":3,"responseTokenCount":4,"totalTokenCount":7}}}"#,
        );
        assert_eq!(nested.usage.map(|u| u.candidate_tokens), Some(4));

        let only = parse_text(r#"{"usageMetadata":{"totalTokenCount":9}}"#);
        assert_eq!(
            only.response,
            IncomingResponse::UsageMetadata(UsageMetadata { total_tokens: 9, ..Default::default() })
        );
    }

    #[test]
    fn test_unknown_keys() {
        assert_eq!(parse_text(r#"{"somethingNew":{"x":1}}"#).response, IncomingResponse::Unknown);
        assert_eq!(parse_text("[1,2,3]").response, IncomingResponse::Unknown);
        assert_eq!(parse_text("42").response, IncomingResponse::Unknown);
    }

    #[test]
    fn test_malformed_text_is_format_error() {
        let err = parse(&Frame::Text("{not json".to_string())).unwrap_err();
        assert!(matches!(err, LiveError::MessageFormat(_)));
    }

    #[test]
    fn test_binary_pcm() {
        let pcm = Bytes::from(vec![0x80u8; 640]);
        let parsed = parse(&Frame::Binary(pcm.clone())).unwrap();
        assert_eq!(parsed.response, IncomingResponse::BinaryAudio(pcm));
    }

    #[test]
    fn test_binary_json_takes_json_path() {
        let parsed = parse(&Frame::Binary(Bytes::from_static(br#"{"setupComplete":{}}"#))).unwrap();
        assert_eq!(parsed.response, IncomingResponse::SetupComplete);
    }

    #[test]
    fn test_binary_utf8_non_object_is_audio() {
        let parsed = parse(&Frame::Binary(Bytes::from_static(b"12"))).unwrap();
        assert!(matches!(parsed.response, IncomingResponse::BinaryAudio(_)));
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration(&json!("10s")), Some(Duration::from_secs(10)));
        assert_eq!(
            parse_duration(&json!({ "seconds": "3", "nanos": 500 })),
            Some(Duration::new(3, 500))
        );
        assert_eq!(parse_duration(&json!("soon")), None);
        assert_eq!(parse_duration(&json!("-1s")), None);
    }
}
