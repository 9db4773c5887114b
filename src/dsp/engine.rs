//! Sample Engine — calls the active sample function once per frame.
//!
//! The engine owns the whole session: persistent state, knob values, held
//! notes and the active function. Control messages are applied between
//! blocks; faults raised by user code silence the faulting frame, roll back
//! that call's state writes and are reported to the UI without stopping the
//! stream.

use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, KnobPolicy, StatePolicy};
use crate::error::{CompileError, FaultKind, ProtocolError, RuntimeFault};
use crate::loader::{self, CallContext, Clock, SampleFunction};
use crate::protocol::{ControlMessage, EngineEvent};
use crate::value::Value;

use super::interpreter::Scratch;
use super::knobs::{KnobRegistry, KnobSlot};
use super::notes::ActiveNotes;
use super::state::{FieldSlot, StateStore};

/// Frames per block when rendering without a host (matches the AudioWorklet quantum).
pub const RENDER_QUANTUM: usize = 128;

/// Distinct fault texts sent per active function before the rest are only counted.
const MAX_REPORTED_FAULTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// No function has compiled yet; blocks render silence.
    Uninitialized,
    Running,
}

/// The most recent runtime fault. Cleared by the next successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultRecord {
    pub kind: FaultKind,
    pub message: String,
    /// Frame on which the fault was raised.
    pub frame: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub blocks: u64,
    pub frames: u64,
    pub faults: u64,
    pub swaps: u64,
    pub compile_errors: u64,
    pub usage_hints: u64,
}

/// The active function with its field and knob names bound to engine slots.
#[derive(Debug)]
struct Active {
    func: Box<dyn SampleFunction>,
    fields: Vec<FieldSlot>,
    knob_slots: Vec<KnobSlot>,
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    phase: EnginePhase,
    state: StateStore,
    knobs: KnobRegistry,
    notes: ActiveNotes,
    scratch: Scratch,
    active: Option<Active>,
    clock: Option<FieldSlot>,
    frame: u64,
    fault: Option<FaultRecord>,
    /// Error texts sent since the last successful swap. The last one is on screen.
    reported: Vec<String>,
    events: Vec<EngineEvent>,
    stats: EngineStats,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let config = config.normalized();
        let mut state = StateStore::new();
        let clock = config.clock_field.as_deref().map(|name| state.slot(name));
        Engine {
            phase: EnginePhase::Uninitialized,
            state,
            knobs: KnobRegistry::new(config.default_knob_value),
            notes: ActiveNotes::new(),
            scratch: Scratch::new(&config),
            active: None,
            clock,
            frame: 0,
            fault: None,
            reported: Vec::new(),
            events: Vec::new(),
            stats: EngineStats::default(),
            config,
        }
    }

    pub fn with_sample_rate(sample_rate: f64) -> Self {
        Engine::new(EngineConfig::with_sample_rate(sample_rate))
    }

    // ── Control plane ───────────────────────────────────────

    /// Apply one control message. Compile errors are reported as events, not returned.
    pub fn apply(&mut self, message: ControlMessage) -> Result<(), ProtocolError> {
        match message.validate()? {
            ControlMessage::ShaderFunction { func } => {
                // Failures are already reported to the UI.
                let _ = self.load(&func);
            }
            ControlMessage::UpdateNote { note, value } => {
                if self.notes.set(note.clone(), value) {
                    debug!("Note {note} {}", if value { "on" } else { "off" });
                }
            }
            ControlMessage::UpdateKnob { name, value } => {
                self.knobs.set(&name, value);
            }
            ControlMessage::LowerUsage => self.lower_usage(),
        }
        Ok(())
    }

    /// Apply every message of a batch in order, logging and skipping invalid ones.
    pub fn apply_batch(&mut self, messages: impl IntoIterator<Item = ControlMessage>) {
        for message in messages {
            if let Err(e) = self.apply(message) {
                warn!("Ignoring control message: {e}");
            }
        }
    }

    pub fn apply_json(&mut self, json: &str) -> Result<(), ProtocolError> {
        let message = ControlMessage::from_json(json).inspect_err(|e| warn!("Ignoring control message: {e}"))?;
        self.apply(message)
    }

    /// Compile `source` and make it the active function at the next frame.
    ///
    /// On failure the previous function keeps running and the rendered
    /// diagnostic is sent to the UI.
    pub fn load(&mut self, source: &str) -> Result<(), CompileError> {
        match loader::load(source) {
            Ok(func) => {
                self.activate(func);
                Ok(())
            }
            Err(e) => {
                self.stats.compile_errors += 1;
                warn!("Snippet failed to compile: {e}");
                self.report(e.render(source));
                Err(e)
            }
        }
    }

    fn activate(&mut self, func: Box<dyn SampleFunction>) {
        if self.config.state_policy == StatePolicy::ResetOnFieldChange {
            if let Some(previous) = &self.active {
                if !same_names(previous.func.fields(), func.fields()) {
                    info!("Field set changed, resetting persistent state");
                    self.state.reset();
                }
            }
        }

        let fields = self.state.bind(func.fields());
        let knob_slots = self.knobs.bind(func.required_knobs());

        if !self.reported.is_empty() {
            self.reported.clear();
            self.events.push(EngineEvent::error(""));
        }
        if let Some(knobs) = self.knobs.announce(func.required_knobs()) {
            debug!("Requesting knobs {knobs:?} ({} without a value yet)", self.knobs.missing(&knobs).len());
            self.events.push(EngineEvent::RequireKnobs { knobs });
        }

        info!(
            "Activated sample function ({} fields, {} knobs)",
            fields.len(),
            knob_slots.len()
        );
        self.active = Some(Active { func, fields, knob_slots });
        self.phase = EnginePhase::Running;
        self.stats.swaps += 1;
    }

    /// Send `text` unless the UI is already showing it.
    fn report(&mut self, text: String) {
        if self.reported.last() == Some(&text) {
            return;
        }
        self.reported.retain(|shown| *shown != text);
        self.events.push(EngineEvent::error(text.clone()));
        self.reported.push(text);
    }

    /// Load-shedding hint from the UI: housekeeping off the per-sample path.
    pub fn lower_usage(&mut self) {
        self.stats.usage_hints += 1;
        self.scratch.compact();
        self.state.compact();
        if self.config.knob_policy == KnobPolicy::ForgetUnused {
            let required = self.active.as_ref().map_or(&[][..], |a| a.func.required_knobs());
            let forgotten = self.knobs.forget_unused(required);
            if forgotten > 0 {
                debug!("Forgot {forgotten} unused knob values");
            }
        }
    }

    /// Take every event emitted since the last drain.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, EngineEvent> {
        self.events.drain(..)
    }

    // ── Rendering ───────────────────────────────────────────

    /// Fill `out` with one sample per frame.
    pub fn render_block(&mut self, out: &mut [f64]) {
        self.stats.blocks += 1;
        self.stats.frames += out.len() as u64;

        let Some(active) = self.active.take() else {
            out.fill(0.0);
            self.frame += out.len() as u64;
            return;
        };

        let start = self.frame;
        let rendered = panic::catch_unwind(AssertUnwindSafe(|| self.render_frames(&active, out)));
        match rendered {
            Ok(()) => self.active = Some(active),
            Err(_) => {
                error!("Sample function panicked, dropping it");
                self.state.rollback();
                out.fill(0.0);
                self.frame = start + out.len() as u64;
                self.report("Internal error: the sample function crashed and was stopped".into());
            }
        }
    }

    fn render_frames(&mut self, active: &Active, out: &mut [f64]) {
        let period = self.config.sample_period();
        for sample in out.iter_mut() {
            if let Some(clock) = self.clock {
                self.state.advance(clock, period);
            }
            self.state.begin();
            let mut ctx = CallContext {
                state: &mut self.state,
                fields: &active.fields,
                knobs: &self.knobs,
                knob_slots: &active.knob_slots,
                notes: &self.notes,
                clock: Clock { sample_rate: self.config.sample_rate, frame: self.frame },
                scratch: &mut self.scratch,
            };
            *sample = match active.func.evaluate(&mut ctx) {
                Ok(value) => {
                    self.state.commit();
                    self.fault = None;
                    match value {
                        Value::Number(n) if n.is_finite() => n,
                        _ => 0.0,
                    }
                }
                Err(fault) => {
                    self.state.rollback();
                    self.record_fault(fault);
                    0.0
                }
            };
            self.frame += 1;
        }
    }

    fn record_fault(&mut self, fault: RuntimeFault) {
        self.stats.faults += 1;
        let text = fault.to_string();
        let fresh = !self.reported.contains(&text) && self.reported.len() < MAX_REPORTED_FAULTS;
        self.fault = Some(FaultRecord { kind: fault.kind, message: text.clone(), frame: self.frame });
        if fresh {
            warn!("Sample function fault at frame {}: {text}", self.frame);
            self.report(text);
        }
    }

    /// Render `frames` samples in quantum-sized blocks.
    pub fn render(&mut self, frames: usize) -> Vec<f64> {
        let mut out = vec![0.0; frames];
        for block in out.chunks_mut(RENDER_QUANTUM) {
            self.render_block(block);
        }
        out
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Mutable state access between blocks.
    pub fn state_mut(&mut self) -> &mut StateStore {
        &mut self.state
    }

    pub fn knobs(&self) -> &KnobRegistry {
        &self.knobs
    }

    pub fn notes(&self) -> &ActiveNotes {
        &self.notes
    }

    pub fn fault(&self) -> Option<&FaultRecord> {
        self.fault.as_ref()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Frames rendered so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    /// Knob names of the active function.
    pub fn required_knobs(&self) -> &[String] {
        self.active.as_ref().map_or(&[][..], |a| a.func.required_knobs())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(EngineConfig::default())
    }
}

fn same_names(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|name| b.contains(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::notes::NoteId;
    use std::f64::consts::PI;

    const SINE: &str = "this.t += 1/44100\nreturn Math.sin(2 * Math.PI * 440 * this.t)";

    fn running(source: &str) -> Engine {
        let mut engine = Engine::default();
        engine.load(source).unwrap_or_else(|e| panic!("compile failed: {e}"));
        engine
    }

    fn errors(engine: &mut Engine) -> Vec<String> {
        engine
            .drain_events()
            .filter_map(|event| match event {
                EngineEvent::Error { error } => Some(error),
                EngineEvent::RequireKnobs { .. } => None,
            })
            .collect()
    }

    #[test]
    fn sine_tutorial_end_to_end() {
        let mut engine = running(SINE);
        let out = engine.render(44100);
        assert_eq!(out.len(), 44100);
        let expected = (2.0 * PI * 440.0 * 100.0 / 44100.0).sin();
        assert!((out[99] - expected).abs() < 1e-9, "got {} expected {expected}", out[99]);
        assert_eq!(engine.stats().blocks, 345);
    }

    #[test]
    fn silence_before_first_compile() {
        let mut engine = Engine::default();
        assert_eq!(engine.phase(), EnginePhase::Uninitialized);
        assert!(engine.render(256).iter().all(|&s| s == 0.0));
        assert!(engine.load("return (").is_err());
        assert_eq!(engine.phase(), EnginePhase::Uninitialized);
        engine.load("return 0.25").unwrap();
        assert_eq!(engine.phase(), EnginePhase::Running);
        assert_eq!(engine.render(4), vec![0.25; 4]);
    }

    #[test]
    fn state_survives_swaps() {
        let mut engine = running("this.phase += 1\nreturn 0");
        engine.render(10);
        engine.load("this.phase += 1\nreturn this.phase").unwrap();
        let out = engine.render(1);
        assert_eq!(out[0], 11.0);
    }

    #[test]
    fn state_resets_on_field_change_when_configured() {
        let config = EngineConfig { state_policy: StatePolicy::ResetOnFieldChange, ..Default::default() };
        let mut engine = Engine::new(config);
        engine.load("this.a += 1\nreturn this.a").unwrap();
        engine.render(5);
        engine.load("this.a += 2\nreturn this.a").unwrap();
        assert_eq!(engine.render(1)[0], 7.0);
        engine.load("this.b += 1\nreturn this.a").unwrap();
        assert_eq!(engine.render(1)[0], 0.0);
    }

    #[test]
    fn clock_field_advances_before_each_call() {
        let mut engine = running("return this.elapsed * 44100");
        let out = engine.render(3);
        for (i, sample) in out.iter().enumerate() {
            assert!((sample - (i + 1) as f64).abs() < 1e-6);
        }
    }

    #[test]
    fn compile_failure_keeps_previous_function() {
        let mut engine = running("return 0.5");
        engine.drain_events().for_each(drop);
        assert!(engine.load("return (0.5 +").is_err());
        assert_eq!(engine.render(8), vec![0.5; 8]);
        let errors = errors(&mut engine);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Syntax error"), "got {}", errors[0]);
        assert_eq!(engine.stats().compile_errors, 1);
    }

    #[test]
    fn faults_are_isolated_and_debounced() {
        let mut engine = running("this.x = 5\nthrow new Error('nope')");
        engine.drain_events().for_each(drop);
        for _ in 0..3 {
            assert!(engine.render(128).iter().all(|&s| s == 0.0));
        }
        assert_eq!(errors(&mut engine), vec!["Uncaught Error: nope".to_string()]);
        assert_eq!(engine.stats().faults, 384);
        assert_eq!(engine.state().get("x"), Value::Number(0.0));
        assert_eq!(engine.fault().map(|f| f.kind), Some(FaultKind::Thrown));
    }

    #[test]
    fn distinct_fault_messages_are_each_reported() {
        let mut engine = running("if (this.elapsed * 44100 < 1.5) throw 'first'\nthrow 'second'");
        engine.drain_events().for_each(drop);
        engine.render(4);
        assert_eq!(errors(&mut engine), vec!["Uncaught first".to_string(), "Uncaught second".to_string()]);
    }

    #[test]
    fn alternating_faults_are_sent_once_each() {
        let mut engine = running("throw currentFrame % 2 == 0 ? 'a' : 'b'");
        engine.drain_events().for_each(drop);
        engine.render(128);
        engine.render(128);
        assert_eq!(errors(&mut engine), vec!["Uncaught a".to_string(), "Uncaught b".to_string()]);
        assert_eq!(engine.stats().faults, 256);
    }

    #[test]
    fn ever_changing_faults_are_capped() {
        let mut engine = running("throw currentFrame");
        engine.drain_events().for_each(drop);
        engine.render(512);
        assert_eq!(errors(&mut engine).len(), MAX_REPORTED_FAULTS);
        assert_eq!(engine.fault().map(|f| f.message.clone()), Some("Uncaught 511".to_string()));

        engine.load("return 0").unwrap();
        assert_eq!(errors(&mut engine), vec![String::new()]);
    }

    #[test]
    fn successful_swap_clears_reported_error() {
        let mut engine = running("throw 'bad'");
        engine.render(1);
        engine.drain_events().for_each(drop);
        engine.load("return 1").unwrap();
        assert_eq!(errors(&mut engine), vec![String::new()]);
        engine.render(1);
        assert!(engine.fault().is_none());

        // Nothing to clear the second time.
        engine.load("return 2").unwrap();
        assert!(errors(&mut engine).is_empty());
    }

    #[test]
    fn fault_clears_after_success() {
        let mut engine = running("if (this.elapsed * 44100 < 1.5) throw 'once'\nreturn 1");
        let out = engine.render(2);
        assert_eq!(out, vec![0.0, 1.0]);
        assert!(engine.fault().is_none());
    }

    #[test]
    fn fresh_knob_reads_default_then_update() {
        let mut engine = running("return knobs.volume");
        let events: Vec<_> = engine.drain_events().collect();
        assert_eq!(events, vec![EngineEvent::RequireKnobs { knobs: vec!["volume".into()] }]);
        assert_eq!(engine.render(1)[0], 0.5);
        engine.apply(ControlMessage::UpdateKnob { name: "volume".into(), value: 0.8 }).unwrap();
        assert_eq!(engine.render(1)[0], 0.8);
    }

    #[test]
    fn require_knobs_only_when_set_changes() {
        let mut engine = running("return knobs.a");
        engine.drain_events().for_each(drop);
        engine.load("return knobs.a * 2").unwrap();
        assert_eq!(engine.drain_events().count(), 0);
        engine.load("return knobs.b").unwrap();
        let events: Vec<_> = engine.drain_events().collect();
        assert_eq!(events, vec![EngineEvent::RequireKnobs { knobs: vec!["b".into()] }]);
    }

    #[test]
    fn unused_knobs_forgotten_only_when_configured() {
        let mut engine = running("return knobs.a");
        engine.apply_json(r#"{"type":"update_knob","name":"a","value":0.9}"#).unwrap();
        engine.load("return knobs.b").unwrap();
        engine.apply(ControlMessage::LowerUsage).unwrap();
        assert_eq!(engine.knobs().get("a"), 0.9);

        let config = EngineConfig { knob_policy: KnobPolicy::ForgetUnused, ..Default::default() };
        let mut engine = Engine::new(config);
        engine.load("return knobs.a").unwrap();
        engine.apply_json(r#"{"type":"update_knob","name":"a","value":0.9}"#).unwrap();
        engine.load("return knobs.b").unwrap();
        engine.apply(ControlMessage::LowerUsage).unwrap();
        assert_eq!(engine.knobs().get("a"), 0.5);
        assert_eq!(engine.stats().usage_hints, 1);
    }

    #[test]
    fn note_toggles_are_idempotent() {
        let mut engine = running("return keys.length");
        let on = ControlMessage::UpdateNote { note: NoteId::Number(60), value: true };
        engine.apply_batch([on.clone(), on]);
        assert_eq!(engine.notes().len(), 1);
        assert_eq!(engine.render(1)[0], 1.0);
    }

    #[test]
    fn non_numbers_render_as_zero() {
        assert_eq!(running("return 'loud'").render(1)[0], 0.0);
        assert_eq!(running("return 1 / 0").render(1)[0], 0.0);
        assert_eq!(running("return").render(1)[0], 0.0);
    }

    #[test]
    fn runaway_loop_is_contained() {
        let config = EngineConfig { max_steps_per_sample: 500, ..Default::default() };
        let mut engine = Engine::new(config);
        engine.load("while (true) { this.x++ }").unwrap();
        assert!(engine.render(4).iter().all(|&s| s == 0.0));
        assert_eq!(engine.fault().map(|f| f.kind), Some(FaultKind::StepBudget));
        assert_eq!(engine.state().get("x"), Value::Number(0.0));
    }

    #[test]
    fn malformed_json_is_ignored() {
        let mut engine = running("return 0.1");
        assert!(engine.apply_json("not json").is_err());
        assert!(engine.apply_json(r#"{"type":"update_knob","name":"a","value":"high"}"#).is_err());
        assert_eq!(engine.render(1)[0], 0.1);
    }
}
