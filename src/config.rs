//! Engine configuration.

use serde::{Deserialize, Serialize};

/// What happens to persistent state when a new function is activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatePolicy {
    /// Keep every field across swaps.
    #[default]
    Retain,
    /// Zero every field when the new function touches a different set of fields.
    ResetOnFieldChange,
}

/// What happens to knob values the active function no longer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KnobPolicy {
    #[default]
    Retain,
    /// Forget them during `lower_usage` housekeeping.
    ForgetUnused,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub sample_rate: f64,
    /// Persistent field the engine advances by one sample period before every call.
    /// `None` disables the clock.
    pub clock_field: Option<String>,
    pub default_knob_value: f64,
    pub state_policy: StatePolicy,
    pub knob_policy: KnobPolicy,
    /// Interpreter steps one sample call may take before it faults.
    pub max_steps_per_sample: u64,
    pub max_call_depth: usize,
    /// Seed for `Math.random()`. Unseeded engines draw a random seed.
    pub random_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44100.0,
            clock_field: Some("elapsed".into()),
            default_knob_value: 0.5,
            state_policy: StatePolicy::Retain,
            knob_policy: KnobPolicy::Retain,
            max_steps_per_sample: 100_000,
            max_call_depth: 64,
            random_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(sample_rate: f64) -> Self {
        EngineConfig { sample_rate, ..Default::default() }.normalized()
    }

    /// Parse a (possibly partial) JSON object; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<EngineConfig>(json).map(EngineConfig::normalized)
    }

    pub fn sample_period(&self) -> f64 {
        1.0 / self.sample_rate
    }

    /// Replace out-of-range values with usable ones.
    pub fn normalized(mut self) -> Self {
        let defaults = EngineConfig::default();
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            self.sample_rate = defaults.sample_rate;
        }
        if !self.default_knob_value.is_finite() {
            self.default_knob_value = defaults.default_knob_value;
        }
        self.default_knob_value = self.default_knob_value.clamp(0.0, 1.0);
        self.max_steps_per_sample = self.max_steps_per_sample.max(1);
        self.max_call_depth = self.max_call_depth.max(1);
        if self.clock_field.as_deref().is_some_and(str::is_empty) {
            self.clock_field = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{"sampleRate": 48000, "knobPolicy": "forgetUnused"}"#).unwrap();
        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.knob_policy, KnobPolicy::ForgetUnused);
        assert_eq!(config.clock_field.as_deref(), Some("elapsed"));
        assert_eq!(config.max_call_depth, 64);
    }

    #[test]
    fn null_clock_disables_it() {
        let config = EngineConfig::from_json(r#"{"clockField": null}"#).unwrap();
        assert_eq!(config.clock_field, None);
    }

    #[test]
    fn normalizes_bad_values() {
        let config = EngineConfig::from_json(r#"{"sampleRate": -1, "defaultKnobValue": 3, "maxStepsPerSample": 0}"#).unwrap();
        assert_eq!(config.sample_rate, 44100.0);
        assert_eq!(config.default_knob_value, 1.0);
        assert_eq!(config.max_steps_per_sample, 1);
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(EngineConfig::from_json(r#"{"statePolicy": "sometimes"}"#).is_err());
    }
}
