//! Control-plane messages exchanged between the UI control surface and the engine.
//!
//! Both directions are JSON objects tagged by `type`, e.g.
//! `{"type": "update_knob", "name": "cutoff", "value": 0.3}`.

use serde::{Deserialize, Serialize};

use crate::dsp::notes::NoteId;
use crate::error::ProtocolError;

/// UI → engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Replace the active sample function.
    ShaderFunction { func: String },
    /// A key went down (`value: true`) or up.
    UpdateNote { note: NoteId, value: bool },
    UpdateKnob { name: String, value: f64 },
    /// Periodic load-shedding hint.
    LowerUsage,
}

/// Engine → UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Compile or runtime fault text. An empty string clears the UI's error field.
    Error { error: String },
    /// The knob names the active function reads.
    RequireKnobs { knobs: Vec<String> },
}

impl ControlMessage {
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        let message: ControlMessage = serde_json::from_str(json)?;
        message.validate()
    }

    /// Reject values the engine cannot use and clamp knob values to [0, 1].
    pub fn validate(self) -> Result<Self, ProtocolError> {
        match self {
            ControlMessage::UpdateKnob { name, value } if !value.is_finite() => {
                Err(ProtocolError::InvalidKnobValue { name, value })
            }
            ControlMessage::UpdateKnob { name, value } => Ok(ControlMessage::UpdateKnob {
                name,
                value: value.clamp(0.0, 1.0),
            }),
            message => Ok(message),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl EngineEvent {
    pub fn error(text: impl Into<String>) -> Self {
        EngineEvent::Error { error: text.into() }
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ui_messages() {
        let msg = ControlMessage::from_json(r#"{"type":"shader_function","func":"return 0"}"#).unwrap();
        assert_eq!(msg, ControlMessage::ShaderFunction { func: "return 0".into() });

        let msg = ControlMessage::from_json(r#"{"type":"update_note","note":60,"value":true}"#).unwrap();
        assert_eq!(msg, ControlMessage::UpdateNote { note: NoteId::Number(60), value: true });

        let msg = ControlMessage::from_json(r#"{"type":"update_note","note":"C4","value":false}"#).unwrap();
        assert_eq!(msg, ControlMessage::UpdateNote { note: NoteId::Name("C4".into()), value: false });

        let msg = ControlMessage::from_json(r#"{"type":"lower_usage"}"#).unwrap();
        assert_eq!(msg, ControlMessage::LowerUsage);
    }

    #[test]
    fn knob_values_are_clamped() {
        let msg = ControlMessage::from_json(r#"{"type":"update_knob","name":"gain","value":1.5}"#).unwrap();
        assert_eq!(msg, ControlMessage::UpdateKnob { name: "gain".into(), value: 1.0 });
    }

    #[test]
    fn non_finite_knob_rejected() {
        let msg = ControlMessage::UpdateKnob { name: "gain".into(), value: f64::NAN };
        assert!(matches!(msg.validate(), Err(ProtocolError::InvalidKnobValue { .. })));
    }

    #[test]
    fn malformed_messages_are_errors() {
        assert!(matches!(ControlMessage::from_json("{"), Err(ProtocolError::Json(_))));
        assert!(ControlMessage::from_json(r#"{"type":"play_loud"}"#).is_err());
        assert!(ControlMessage::from_json(r#"{"type":"update_knob","name":"x"}"#).is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        assert_eq!(EngineEvent::error("boom").to_json(), r#"{"type":"error","error":"boom"}"#);
        let event = EngineEvent::RequireKnobs { knobs: vec!["a".into(), "b".into()] };
        assert_eq!(event.to_json(), r#"{"type":"require_knobs","knobs":["a","b"]}"#);
        assert_eq!(EngineEvent::from_json(&event.to_json()).unwrap(), event);
    }
}
