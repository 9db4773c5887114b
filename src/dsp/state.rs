//! Persistent state store: the fields a sample function reaches through `this`.
//!
//! Fields are interned to stable slots the first time any function names them
//! and live for the whole engine session. Swapping the active function never
//! re-allocates a slot, so a phase accumulator keeps counting across edits.

use std::collections::HashMap;

use crate::value::Value;

/// Stable index of a persistent field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSlot(pub(crate) usize);

#[derive(Debug, Default)]
pub struct StateStore {
    names: Vec<String>,
    index: HashMap<String, usize>,
    values: Vec<Value>,
    /// Value of each slot before its first write in the current call.
    journal: Vec<(usize, Value)>,
    /// Call epoch in which each slot was last journaled.
    touched: Vec<u64>,
    epoch: u64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`, creating the field with value `0` if it does not exist yet.
    pub fn slot(&mut self, name: &str) -> FieldSlot {
        if let Some(&idx) = self.index.get(name) {
            return FieldSlot(idx);
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        self.values.push(Value::Number(0.0));
        self.touched.push(0);
        FieldSlot(idx)
    }

    /// Intern every name in order, returning the slots positionally.
    pub fn bind(&mut self, names: &[String]) -> Vec<FieldSlot> {
        names.iter().map(|name| self.slot(name)).collect()
    }

    pub fn lookup(&self, name: &str) -> Option<FieldSlot> {
        self.index.get(name).copied().map(FieldSlot)
    }

    /// Current value of `name`; fields never written read as `0`.
    pub fn get(&self, name: &str) -> Value {
        self.lookup(name).map(|slot| self.read(slot).clone()).unwrap_or(Value::Number(0.0))
    }

    /// Set a field from outside a sample call. Not journaled.
    pub fn set(&mut self, name: &str, value: Value) {
        let slot = self.slot(name);
        self.values[slot.0] = value;
    }

    pub fn read(&self, slot: FieldSlot) -> &Value {
        &self.values[slot.0]
    }

    /// Write from inside a sample call; the first write per call is journaled.
    pub fn write(&mut self, slot: FieldSlot, value: Value) {
        let idx = slot.0;
        if self.touched[idx] != self.epoch {
            self.touched[idx] = self.epoch;
            let previous = std::mem::replace(&mut self.values[idx], value);
            self.journal.push((idx, previous));
        } else {
            self.values[idx] = value;
        }
    }

    /// Add `delta` to a numeric field without journaling it.
    pub fn advance(&mut self, slot: FieldSlot, delta: f64) {
        let next = self.values[slot.0].to_number() + delta;
        self.values[slot.0] = Value::Number(next);
    }

    /// Start journaling a new sample call.
    pub fn begin(&mut self) {
        self.epoch += 1;
        self.journal.clear();
    }

    /// Keep every write of the current call.
    pub fn commit(&mut self) {
        self.journal.clear();
    }

    /// Undo every write of the current call.
    pub fn rollback(&mut self) {
        while let Some((idx, previous)) = self.journal.pop() {
            self.values[idx] = previous;
        }
    }

    /// Set every field back to `0`. Slots stay valid.
    pub fn reset(&mut self) {
        self.values.iter_mut().for_each(|v| *v = Value::Number(0.0));
        self.journal.clear();
    }

    /// Release journal capacity grown by a write-heavy function.
    pub fn compact(&mut self) {
        self.journal.shrink_to_fit();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
