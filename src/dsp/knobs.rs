//! Knob registry for the named [0, 1] parameters the UI owns and sample functions read.

use std::collections::HashMap;

/// Stable index of a knob name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KnobSlot(pub(crate) usize);

#[derive(Debug)]
pub struct KnobRegistry {
    names: Vec<String>,
    index: HashMap<String, usize>,
    /// `None` until the UI has sent a value for the name.
    values: Vec<Option<f64>>,
    default: f64,
    /// The knob set last sent in a `require_knobs` event.
    announced: Option<Vec<String>>,
}

impl KnobRegistry {
    pub fn new(default: f64) -> Self {
        KnobRegistry {
            names: Vec::new(),
            index: HashMap::new(),
            values: Vec::new(),
            default: default.clamp(0.0, 1.0),
            announced: None,
        }
    }

    pub fn slot(&mut self, name: &str) -> KnobSlot {
        if let Some(&idx) = self.index.get(name) {
            return KnobSlot(idx);
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        self.values.push(None);
        KnobSlot(idx)
    }

    pub fn bind(&mut self, names: &[String]) -> Vec<KnobSlot> {
        names.iter().map(|name| self.slot(name)).collect()
    }

    /// Store a knob value, clamped to [0, 1]. Returns the stored value.
    pub fn set(&mut self, name: &str, value: f64) -> f64 {
        let slot = self.slot(name);
        let value = value.clamp(0.0, 1.0);
        self.values[slot.0] = Some(value);
        value
    }

    pub fn value(&self, slot: KnobSlot) -> f64 {
        self.values[slot.0].unwrap_or(self.default)
    }

    /// Value of `name`, or the default if the UI has not sent one.
    pub fn get(&self, name: &str) -> f64 {
        self.index.get(name).map_or(self.default, |&idx| self.value(KnobSlot(idx)))
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.index.get(name).is_some_and(|&idx| self.values[idx].is_some())
    }

    /// Names in `required` that still read the default.
    pub fn missing(&self, required: &[String]) -> Vec<String> {
        required.iter().filter(|name| !self.has_value(name)).cloned().collect()
    }

    /// Drop values of knobs not in `required`. Slots stay allocated.
    pub fn forget_unused(&mut self, required: &[String]) -> usize {
        let mut forgotten = 0;
        for (idx, name) in self.names.iter().enumerate() {
            if self.values[idx].is_some() && !required.contains(name) {
                self.values[idx] = None;
                forgotten += 1;
            }
        }
        forgotten
    }

    /// Record `required` as announced. Returns it if it differs from the last announcement.
    pub fn announce(&mut self, required: &[String]) -> Option<Vec<String>> {
        if self.announced.as_deref() == Some(required) {
            return None;
        }
        self.announced = Some(required.to_vec());
        Some(required.to_vec())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names.iter().zip(self.values.iter()).map(|(name, value)| (name.as_str(), value.unwrap_or(self.default)))
    }

    pub fn default_value(&self) -> f64 {
        self.default
    }
}

impl Default for KnobRegistry {
    fn default() -> Self {
        KnobRegistry::new(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn unknown_knob_reads_default() {
        let mut knobs = KnobRegistry::default();
        assert_eq!(knobs.get("cutoff"), 0.5);
        let slot = knobs.slot("cutoff");
        assert_eq!(knobs.value(slot), 0.5);
        knobs.set("cutoff", 0.25);
        assert_eq!(knobs.value(slot), 0.25);
    }

    #[test]
    fn values_are_clamped() {
        let mut knobs = KnobRegistry::default();
        assert_eq!(knobs.set("gain", 1.7), 1.0);
        assert_eq!(knobs.set("gain", -3.0), 0.0);
    }

    #[test]
    fn missing_lists_knobs_without_values() {
        let mut knobs = KnobRegistry::default();
        knobs.set("a", 0.1);
        assert_eq!(knobs.missing(&names(&["a", "b", "c"])), names(&["b", "c"]));
    }

    #[test]
    fn announce_only_on_change() {
        let mut knobs = KnobRegistry::default();
        assert_eq!(knobs.announce(&names(&["a"])), Some(names(&["a"])));
        assert_eq!(knobs.announce(&names(&["a"])), None);
        assert_eq!(knobs.announce(&names(&["a", "b"])), Some(names(&["a", "b"])));
        assert_eq!(knobs.announce(&[]), Some(Vec::new()));
    }

    #[test]
    fn forget_unused_keeps_required() {
        let mut knobs = KnobRegistry::default();
        knobs.set("keep", 0.9);
        knobs.set("drop", 0.1);
        assert_eq!(knobs.forget_unused(&names(&["keep"])), 1);
        assert_eq!(knobs.get("keep"), 0.9);
        assert_eq!(knobs.get("drop"), 0.5);
    }
}
