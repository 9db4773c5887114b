//! Held notes and note-number helpers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::Value;

/// A note identifier as sent by the keyboard: a MIDI number or a name like `"C#4"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoteId {
    Number(i64),
    Name(String),
}

impl NoteId {
    pub fn to_value(&self) -> Value {
        match self {
            NoteId::Number(n) => Value::Number(*n as f64),
            NoteId::Name(name) => Value::str(name),
        }
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteId::Number(n) => write!(f, "{n}"),
            NoteId::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Currently held notes in press order.
#[derive(Debug, Default)]
pub struct ActiveNotes {
    notes: Vec<NoteId>,
    values: Vec<Value>,
}

impl ActiveNotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a note as held or released. Returns `false` if nothing changed.
    pub fn set(&mut self, note: NoteId, held: bool) -> bool {
        let position = self.notes.iter().position(|n| *n == note);
        match (position, held) {
            (None, true) => {
                self.values.push(note.to_value());
                self.notes.push(note);
                true
            }
            (Some(idx), false) => {
                self.notes.remove(idx);
                self.values.remove(idx);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, note: &NoteId) -> bool {
        self.notes.contains(note)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// `keys[i]`; out of range reads `undefined`.
    pub fn value(&self, index: f64) -> Value {
        if index < 0.0 || index.fract() != 0.0 {
            return Value::Undefined;
        }
        self.values.get(index as usize).cloned().unwrap_or_default()
    }

    /// `keys.includes(x)` with strict equality.
    pub fn includes(&self, needle: &Value) -> bool {
        self.values.iter().any(|v| v.strict_eq(needle))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = &NoteId> {
        self.notes.iter()
    }

    pub fn clear(&mut self) {
        self.notes.clear();
        self.values.clear();
    }
}

/// Parse a note name like `"C4"`, `"F#3"` or `"Bb-1"` into a MIDI number (C4 = 60).
pub fn note_to_midi(note: &str) -> Option<i32> {
    let bytes = note.as_bytes();
    let base_semitone = match bytes.first()?.to_ascii_uppercase() {
        b'C' => 0,
        b'D' => 2,
        b'E' => 4,
        b'F' => 5,
        b'G' => 7,
        b'A' => 9,
        b'B' => 11,
        _ => return None,
    };

    let mut idx = 1;
    let mut semitone = base_semitone;
    match bytes.get(idx) {
        Some(b'#') => {
            semitone += 1;
            idx += 1;
        }
        Some(b'b') => {
            semitone -= 1;
            idx += 1;
        }
        _ => {}
    }

    let octave: i32 = note[idx..].parse().ok()?;
    Some((octave + 1) * 12 + semitone)
}

/// Equal-tempered frequency of a (possibly fractional) MIDI note.
pub fn midi_to_frequency(midi: f64, tuning_pitch: f64) -> f64 {
    tuning_pitch * 2.0_f64.powf((midi - 69.0) / 12.0)
}

/// `mtof(x)`: numbers are MIDI notes, strings are note names or numeric text.
pub fn mtof(note: &Value) -> f64 {
    let midi = match note {
        Value::Str(name) => match note_to_midi(name.trim()) {
            Some(midi) => f64::from(midi),
            None => note.to_number(),
        },
        other => other.to_number(),
    };
    midi_to_frequency(midi, 440.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_to_midi_basic() {
        assert_eq!(note_to_midi("A4"), Some(69));
        assert_eq!(note_to_midi("C4"), Some(60));
        assert_eq!(note_to_midi("C#4"), Some(61));
        assert_eq!(note_to_midi("Bb3"), Some(58));
        assert_eq!(note_to_midi("C-1"), Some(0));
        assert_eq!(note_to_midi("H2"), None);
        assert_eq!(note_to_midi(""), None);
    }

    #[test]
    fn mtof_accepts_numbers_and_names() {
        assert!((mtof(&Value::Number(69.0)) - 440.0).abs() < 1e-9);
        assert!((mtof(&Value::str("A5")) - 880.0).abs() < 1e-9);
        assert!((mtof(&Value::str("60")) - 261.6256).abs() < 1e-3);
        assert!(mtof(&Value::Undefined).is_nan());
    }

    #[test]
    fn repeated_note_on_is_idempotent() {
        let mut notes = ActiveNotes::new();
        assert!(notes.set(NoteId::Number(60), true));
        assert!(!notes.set(NoteId::Number(60), true));
        assert_eq!(notes.len(), 1);
        assert!(!notes.set(NoteId::Number(62), false));
        assert!(notes.set(NoteId::Number(60), false));
        assert!(notes.is_empty());
    }

    #[test]
    fn press_order_is_kept() {
        let mut notes = ActiveNotes::new();
        notes.set(NoteId::Name("E4".into()), true);
        notes.set(NoteId::Number(60), true);
        notes.set(NoteId::Name("G4".into()), true);
        notes.set(NoteId::Number(60), false);
        assert_eq!(notes.value(0.0), Value::str("E4"));
        assert_eq!(notes.value(1.0), Value::str("G4"));
        assert_eq!(notes.value(2.0), Value::Undefined);
        assert_eq!(notes.value(0.5), Value::Undefined);
        assert!(notes.includes(&Value::str("G4")));
        assert!(!notes.includes(&Value::Number(60.0)));
    }

    #[test]
    fn note_id_deserializes_untagged() {
        let n: NoteId = serde_json::from_str("64").unwrap();
        assert_eq!(n, NoteId::Number(64));
        let s: NoteId = serde_json::from_str("\"C4\"").unwrap();
        assert_eq!(s, NoteId::Name("C4".into()));
    }
}
