//! Live API WebSocket message types.
//!
//! The Inference Session speaks JSON over WebSocket. Unlike type-tagged
//! protocols, each message is identified by which single top-level field
//! it carries.
//!
//! Client messages (sent to server):
//! - setup - Session configuration, first frame after the socket opens
//! - realtimeInput - Base64 media chunks (microphone audio, JPEG frames)
//! - toolResponse - Results for a previously received tool call batch
//!
//! Server messages (received from server):
//! - setupComplete - Session open acknowledgment
//! - serverContent - Model output: audio/text parts, interruption and
//!   turn-completion markers
//! - toolCall - Batch of function invocations to execute client-side

use serde::{Deserialize, Serialize};

use crate::config::{INPUT_SAMPLE_RATE, LiveConfig, OUTPUT_SAMPLE_RATE};
use crate::tools::{ToolDeclaration, ToolInvocation, ToolKind, ToolResult};

// =============================================================================
// Client Messages
// =============================================================================

/// Message sent from client to the Inference Session.
///
/// External tagging produces the wire shape directly: `{"setup": {...}}`,
/// `{"realtimeInput": {...}}`, `{"toolResponse": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session configuration
    Setup(SessionSetup),
    /// Streaming media input
    RealtimeInput(RealtimeInput),
    /// Tool call results
    ToolResponse(ToolResponsePayload),
}

impl ClientMessage {
    /// One block of microphone audio, already base64 encoded.
    pub fn audio_chunk(encoded: String) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk::pcm_audio(encoded, INPUT_SAMPLE_RATE)],
        })
    }

    /// One visual frame, already JPEG compressed and base64 encoded.
    pub fn jpeg_frame(encoded: String) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk::jpeg(encoded)],
        })
    }

    /// Results for a tool call batch. An empty batch still produces a
    /// (empty) response message.
    pub fn tool_results(responses: Vec<ToolResult>) -> Self {
        ClientMessage::ToolResponse(ToolResponsePayload {
            function_responses: responses,
        })
    }
}

/// Session configuration, sent once as the first frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    /// Fully qualified model resource name (`models/<id>`)
    pub model: String,
    /// Output modality and voice selection
    pub generation_config: GenerationConfig,
    /// Persona plus remembered-facts context
    pub system_instruction: Content,
    /// Declared function surface
    pub tools: Vec<ToolGroup>,
}

impl SessionSetup {
    /// Assemble the setup frame from session configuration.
    ///
    /// `memory_context` is the formatted long-term memory block, empty when
    /// nothing has been remembered yet.
    pub fn for_session(config: &LiveConfig, memory_context: &str) -> Self {
        Self {
            model: format!("models/{}", config.model),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice.clone(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: config.system_instruction(memory_context),
                }],
            },
            tools: vec![ToolGroup {
                function_declarations: ToolKind::declarations(),
            }],
        }
    }
}

/// Generation parameters for the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Output modalities, audio-only for this client
    pub response_modalities: Vec<String>,
    /// Voice selection
    pub speech_config: SpeechConfig,
}

/// Speech synthesis configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

/// Voice configuration wrapper.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

/// Named prebuilt voice.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Text content container for system instructions.
#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

/// Single text part.
#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    pub text: String,
}

/// Group of function declarations exposed to the model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolGroup {
    pub function_declarations: Vec<ToolDeclaration>,
}

/// Streaming media payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

/// One base64 media chunk with its MIME type.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

impl MediaChunk {
    /// PCM16 audio chunk at the given sample rate.
    pub fn pcm_audio(encoded: String, sample_rate: u32) -> Self {
        Self {
            mime_type: format!("audio/pcm;rate={sample_rate}"),
            data: encoded,
        }
    }

    /// JPEG image chunk.
    pub fn jpeg(encoded: String) -> Self {
        Self {
            mime_type: "image/jpeg".to_string(),
            data: encoded,
        }
    }
}

/// Tool results payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponsePayload {
    pub function_responses: Vec<ToolResult>,
}

// =============================================================================
// Server Messages
// =============================================================================

/// Message received from the Inference Session.
///
/// A single frame may carry more than one field, so this is a struct of
/// options rather than an enum. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Session open acknowledgment
    pub setup_complete: Option<SetupComplete>,
    /// Model output
    pub server_content: Option<ServerContent>,
    /// Function invocation batch
    pub tool_call: Option<ToolCallPayload>,
}

/// Empty acknowledgment body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetupComplete {}

/// Model output: parts plus turn markers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    /// Audio and text parts of the current turn
    pub model_turn: Option<ModelTurn>,
    /// Set when the user started speaking over the model
    pub interrupted: Option<bool>,
    /// Set when the model finished its turn
    pub turn_complete: Option<bool>,
}

/// Parts of one model turn.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

/// One part of a model turn: inline media, text, or both.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    pub inline_data: Option<InlineData>,
    pub text: Option<String>,
}

/// Base64 payload with its MIME type.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl InlineData {
    /// Whether this part carries PCM audio.
    pub fn is_pcm_audio(&self) -> bool {
        self.mime_type.starts_with("audio/pcm")
    }

    /// Sample rate from the MIME parameter, falling back to the session
    /// output rate when the server omits it.
    pub fn sample_rate(&self) -> u32 {
        self.mime_type
            .split(';')
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.parse().ok())
            .unwrap_or(OUTPUT_SAMPLE_RATE)
    }
}

/// Function invocation batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPayload {
    #[serde(default)]
    pub function_calls: Vec<ToolInvocation>,
}

// =============================================================================
// Tests
// =============================================================================
