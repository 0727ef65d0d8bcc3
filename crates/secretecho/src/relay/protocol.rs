//! Wire protocol types for both sides of the relay.
//!
//! Client frames travel between the browser and the relay as JSON text.
//! Upstream frames follow the Gemini Live `BidiGenerateContent` protocol;
//! field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::companion::CompanionProfile;

/// Error text returned for unparseable or empty client frames.
pub const INVALID_MESSAGE_FORMAT: &str = "Invalid message format";

/// Context preamble prepended to the serialized history when replaying a
/// stored conversation into a fresh upstream session.
pub const HISTORY_CONTEXT_PREAMBLE: &str = "This is the previous chat context, and if you don't tell user you know their history just keep it in mind and it will help you generating next response:\n";

/// Fixed priming message sent when no stored history exists. Its turn
/// output is discarded, the model introduces itself on the next real
/// message instead.
pub const GREETING_PRIMER: &str =
    "Hi dont give response this hi when i ask next question just introduce yourself next message when i ask";

// ============================================================================
// Client <-> relay frames
// ============================================================================

#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(default)]
    message: Option<String>,
}

/// Parse an inbound client frame, requiring a non-empty `message` string.
pub fn parse_client_message(raw: &str) -> Option<String> {
    let frame: ClientFrame = serde_json::from_str(raw).ok()?;
    match frame.message {
        Some(message) if !message.is_empty() => Some(message),
        _ => None,
    }
}

/// Empty JSON object payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Empty {}

/// Upstream connection status reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
}

/// Frames sent from the relay to the browser client.
///
/// Each variant serializes to a distinct single-key JSON object, e.g.
/// `{"status":"connected"}` or `{"response":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientEvent {
    Status {
        status: ConnectionStatus,
    },
    SetupComplete {
        #[serde(rename = "setupComplete")]
        setup_complete: Empty,
    },
    Response {
        response: String,
    },
    Error {
        error: String,
    },
}

impl ClientEvent {
    pub fn connected() -> Self {
        ClientEvent::Status {
            status: ConnectionStatus::Connected,
        }
    }

    pub fn setup_complete() -> Self {
        ClientEvent::SetupComplete {
            setup_complete: Empty {},
        }
    }

    pub fn response(text: impl Into<String>) -> Self {
        ClientEvent::Response {
            response: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        ClientEvent::Error { error: text.into() }
    }
}

// ============================================================================
// Relay <-> Gemini Live frames
// ============================================================================

/// One piece of model or user content. Text parts carry `text`; media
/// parts carry `inlineData` and are ignored by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveConfig {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: SystemInstruction,
}

/// Setup handshake frame establishing model, prompt and response format.
#[derive(Debug, Clone, Serialize)]
pub struct SetupMessage {
    pub setup: LiveConfig,
}

impl SetupMessage {
    /// Build the setup frame for a companion, requesting text responses.
    pub fn new(model: impl Into<String>, profile: &CompanionProfile) -> Self {
        Self {
            setup: LiveConfig {
                model: model.into(),
                generation_config: GenerationConfig {
                    response_modalities: "text".to_string(),
                },
                system_instruction: SystemInstruction {
                    parts: vec![TextPart {
                        text: profile.system_prompt.clone(),
                    }],
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

/// Outbound content frame carrying one complete user turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContentMessage {
    pub client_content: ClientContent,
}

impl ClientContentMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            client_content: ClientContent {
                turns: vec![Content {
                    role: "user".to_string(),
                    parts: vec![Part::text(text)],
                }],
                turn_complete: true,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// Streaming content payload from the provider. A single frame may carry
/// fragments, a turn-complete signal, or both.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

/// Any inbound upstream frame: a setup ack, streamed content, or neither
/// (unrecognized frames are logged and dropped).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveIncoming {
    #[serde(default)]
    pub setup_complete: Option<Empty>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> CompanionProfile {
        CompanionProfile {
            code: "buddy".to_string(),
            name: "EchoBuddy".to_string(),
            description: String::new(),
            system_prompt: "Be a friend.".to_string(),
        }
    }

    #[test]
    fn test_parse_client_message() {
        assert_eq!(
            parse_client_message(r#"{"message":"Hello"}"#),
            Some("Hello".to_string())
        );
        assert_eq!(parse_client_message(r#"{"message":""}"#), None);
        assert_eq!(parse_client_message(r#"{"foo":"bar"}"#), None);
        assert_eq!(parse_client_message(r#"{"message":5}"#), None);
        assert_eq!(parse_client_message("not json"), None);
    }

    #[test]
    fn test_client_event_shapes() {
        assert_eq!(
            serde_json::to_string(&ClientEvent::connected()).unwrap(),
            r#"{"status":"connected"}"#
        );
        assert_eq!(
            serde_json::to_string(&ClientEvent::setup_complete()).unwrap(),
            r#"{"setupComplete":{}}"#
        );
        assert_eq!(
            serde_json::to_string(&ClientEvent::response("hi")).unwrap(),
            r#"{"response":"hi"}"#
        );
        assert_eq!(
            serde_json::to_string(&ClientEvent::error("boom")).unwrap(),
            r#"{"error":"boom"}"#
        );
    }

    #[test]
    fn test_setup_message_shape() {
        let frame =
            serde_json::to_value(SetupMessage::new("models/gemini-2.0-flash-exp", &profile()))
                .unwrap();
        assert_eq!(frame["setup"]["model"], "models/gemini-2.0-flash-exp");
        assert_eq!(
            frame["setup"]["generationConfig"]["responseModalities"],
            "text"
        );
        assert_eq!(
            frame["setup"]["systemInstruction"]["parts"][0]["text"],
            "Be a friend."
        );
    }

    #[test]
    fn test_client_content_shape() {
        let frame = serde_json::to_value(ClientContentMessage::user_text("Hello")).unwrap();
        assert_eq!(frame["clientContent"]["turnComplete"], true);
        assert_eq!(frame["clientContent"]["turns"][0]["role"], "user");
        assert_eq!(frame["clientContent"]["turns"][0]["parts"][0]["text"], "Hello");
        // No inlineData key on text parts
        assert!(
            frame["clientContent"]["turns"][0]["parts"][0]
                .get("inlineData")
                .is_none()
        );
    }

    #[test]
    fn test_parse_incoming_setup_complete() {
        let incoming: LiveIncoming = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert!(incoming.setup_complete.is_some());
        assert!(incoming.server_content.is_none());
    }

    #[test]
    fn test_parse_incoming_server_content() {
        let raw = r#"{"serverContent":{"modelTurn":{"parts":[{"text":"Hel"},{"inlineData":{"mimeType":"image/png","data":"AAA"}}]},"turnComplete":true}}"#;
        let incoming: LiveIncoming = serde_json::from_str(raw).unwrap();
        let content = incoming.server_content.unwrap();
        let turn = content.model_turn.unwrap();
        assert_eq!(turn.parts.len(), 2);
        assert_eq!(turn.parts[0].text.as_deref(), Some("Hel"));
        assert!(turn.parts[1].inline_data.is_some());
        assert!(content.turn_complete);
        assert!(!content.interrupted);
    }
}
