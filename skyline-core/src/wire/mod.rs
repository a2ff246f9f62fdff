//! Typed wire contract with the conversational endpoint.
//!
//! Outbound, once per capture frame while unmuted:
//!
//! ```json
//! { "realtimeInput": { "media": { "data": "<base64 PCM16LE>", "mimeType": "audio/pcm;rate=16000" } } }
//! ```
//!
//! Inbound messages carry zero or one base64 PCM16LE 24 kHz audio part, an
//! optional `interrupted` flag (barge-in), and an optional turn-completion
//! marker. Everything else the endpoint sends is ignored.

pub mod pcm;

use serde::{Deserialize, Serialize};
use serde_json::json;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A base64-encoded media payload plus its MIME-style format tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub data: String,
    pub mime_type: String,
}

/// One capture frame headed for the remote endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeInput {
    pub media: MediaBlob,
}

impl RealtimeInput {
    /// Package a block of normalized f32 samples as a 16 kHz PCM16LE frame.
    pub fn audio_frame(samples: &[f32]) -> Self {
        Self {
            media: MediaBlob {
                data: pcm::encode_frame(samples),
                mime_type: pcm::INPUT_MIME_TYPE.to_string(),
            },
        }
    }
}

/// Connection negotiation parameters, sent once when the stream opens.
#[derive(Debug, Clone)]
pub struct SetupRequest {
    /// Remote model identifier.
    pub model: String,
    /// Prebuilt synthesized-voice identity.
    pub voice_name: String,
    /// Free-text behavioral instruction describing the mentor persona.
    pub system_instruction: String,
}

impl SetupRequest {
    /// Render the negotiation message in the endpoint's wire shape.
    /// Response modality is always audio-only.
    pub fn to_wire(&self) -> serde_json::Value {
        json!({
            "setup": {
                "model": self.model,
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": {
                        "voiceConfig": {
                            "prebuiltVoiceConfig": { "voiceName": self.voice_name }
                        }
                    }
                },
                "systemInstruction": {
                    "parts": [{ "text": self.system_instruction }]
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// One message from the remote endpoint. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    /// Barge-in: the user began speaking over synthesized output.
    pub interrupted: Option<bool>,
    pub turn_complete: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTurn {
    pub parts: Vec<TurnPart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TurnPart {
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InlineData {
    pub data: String,
    pub mime_type: Option<String>,
}

impl ServerMessage {
    /// Base64 audio payload of this message, if any.
    ///
    /// The endpoint delivers at most one audio part per message; only the
    /// first part is consulted.
    pub fn audio_payload(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()?
            .parts
            .first()?
            .inline_data
            .as_ref()
            .map(|d| d.data.as_str())
    }

    pub fn is_interrupted(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|c| c.interrupted)
            .unwrap_or(false)
    }
}
