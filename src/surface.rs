//! UI-side model of the control surface: what the editor, keyboard and knob
//! panel send to the engine and how they react to engine events.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crossbeam::channel::Sender;

use crate::dsp::notes::NoteId;
use crate::port::Port;
use crate::protocol::{ControlMessage, EngineEvent};

/// Value a knob shows before the user has touched it.
pub const DEFAULT_KNOB_VALUE: f64 = 0.5;

/// Wrap an editor body as the function expression the engine compiles.
pub fn wrap_snippet(body: &str) -> String {
    format!("(\n  function(knobs, keys) {{\n{body}\n\n  }}\n)")
}

#[derive(Debug, Default)]
pub struct ControlSurface {
    port: Port,
    /// Every knob value the user has set, including knobs no longer shown.
    remembered: HashMap<String, f64>,
    /// Knobs currently shown, as last requested by the engine.
    panel: BTreeMap<String, f64>,
    keys: Vec<NoteId>,
    error: String,
}

impl ControlSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// The editor text changed.
    pub fn update_code(&mut self, body: &str) {
        self.port.post_message(ControlMessage::ShaderFunction { func: wrap_snippet(body) });
    }

    /// A keyboard key went down or up. Repeated presses of a held key send nothing.
    pub fn update_note(&mut self, note: NoteId, held: bool) {
        let position = self.keys.iter().position(|k| *k == note);
        match (position, held) {
            (None, true) => self.keys.push(note.clone()),
            (Some(idx), false) => {
                self.keys.remove(idx);
            }
            _ => return,
        }
        self.port.post_message(ControlMessage::UpdateNote { note, value: held });
    }

    pub fn update_knob(&mut self, name: &str, value: f64) {
        let value = value.clamp(0.0, 1.0);
        self.remembered.insert(name.to_string(), value);
        if let Some(shown) = self.panel.get_mut(name) {
            *shown = value;
        }
        self.port.post_message(ControlMessage::UpdateKnob { name: name.to_string(), value });
    }

    /// Periodic load-shedding hint.
    pub fn lower_usage(&mut self) {
        self.port.post_message(ControlMessage::LowerUsage);
    }

    /// The engine channel became available.
    pub fn connect(&mut self, sender: Sender<ControlMessage>) {
        self.port.connect(sender);
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Error { error } => self.error = error,
            EngineEvent::RequireKnobs { knobs } => {
                self.panel.clear();
                for name in knobs {
                    let value = self.remembered.get(&name).copied().unwrap_or(DEFAULT_KNOB_VALUE);
                    self.panel.insert(name.clone(), value);
                    self.port.post_message(ControlMessage::UpdateKnob { name, value });
                }
            }
        }
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn panel(&self) -> &BTreeMap<String, f64> {
        &self.panel
    }

    pub fn keys(&self) -> &[NoteId] {
        &self.keys
    }

    pub fn port(&self) -> &Port {
        &self.port
    }
}
