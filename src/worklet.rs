//! WASM surface for an `AudioWorkletProcessor`.
//!
//! The JS processor forwards `port.onmessage` payloads to `postMessage`, calls
//! `process` with its output channel once per render quantum and posts
//! whatever `takeMessages` returns back to the UI.

use tracing::warn;
use wasm_bindgen::prelude::*;

use crate::config::EngineConfig;
use crate::dsp::engine::Engine;
use crate::error::ProtocolError;
use crate::protocol::{ControlMessage, EngineEvent};

#[wasm_bindgen]
pub struct SynthProcessor {
    engine: Engine,
    block: Vec<f64>,
}

#[wasm_bindgen]
impl SynthProcessor {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> SynthProcessor {
        SynthProcessor::from_engine(Engine::with_sample_rate(sample_rate))
    }

    /// Build from a (possibly partial) `EngineConfig` object.
    #[wasm_bindgen(js_name = withConfig)]
    pub fn with_config(config: JsValue) -> Result<SynthProcessor, JsValue> {
        let config: EngineConfig =
            serde_wasm_bindgen::from_value(config).map_err(|e| JsValue::from_str(&format!("{e}")))?;
        Ok(SynthProcessor::from_engine(Engine::new(config)))
    }

    /// Apply one control message object, e.g. `{type: "update_knob", name, value}`.
    #[wasm_bindgen(js_name = postMessage)]
    pub fn post_message(&mut self, message: JsValue) -> Result<(), JsValue> {
        let decoded = serde_wasm_bindgen::from_value::<ControlMessage>(message)
            .map_err(|e| ProtocolError::Decode(e.to_string()))
            .and_then(|message| self.engine.apply(message));
        decoded.map_err(|e| {
            warn!("Ignoring control message: {e}");
            JsValue::from_str(&format!("{e}"))
        })
    }

    #[wasm_bindgen(js_name = postMessageJson)]
    pub fn post_message_json(&mut self, json: &str) -> Result<(), JsValue> {
        self.engine.apply_json(json).map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    /// Render one block into `out`.
    pub fn process(&mut self, out: &mut [f32]) {
        self.block.resize(out.len(), 0.0);
        self.engine.render_block(&mut self.block);
        for (dst, &src) in out.iter_mut().zip(self.block.iter()) {
            *dst = src as f32;
        }
    }

    /// Events for the UI since the last call, as an array of message objects.
    #[wasm_bindgen(js_name = takeMessages)]
    pub fn take_messages(&mut self) -> Result<JsValue, JsValue> {
        let events = self.drain();
        serde_wasm_bindgen::to_value(&events).map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    #[wasm_bindgen(js_name = takeMessagesJson)]
    pub fn take_messages_json(&mut self) -> String {
        serde_json::to_string(&self.drain()).unwrap_or_else(|_| "[]".into())
    }

    #[wasm_bindgen(js_name = sampleRate)]
    pub fn sample_rate(&self) -> f64 {
        self.engine.sample_rate()
    }

    pub fn stats(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.engine.stats()).map_err(|e| JsValue::from_str(&format!("{e}")))
    }
}

impl SynthProcessor {
    fn from_engine(engine: Engine) -> Self {
        SynthProcessor { engine, block: Vec::with_capacity(128) }
    }

    fn drain(&mut self) -> Vec<EngineEvent> {
        self.engine.drain_events().collect()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_like_the_worklet() {
        let mut processor = SynthProcessor::new(44100.0);
        processor
            .post_message_json(r#"{"type":"shader_function","func":"(function(knobs, keys) { return knobs.amp })"}"#)
            .unwrap();
        processor.post_message_json(r#"{"type":"update_knob","name":"amp","value":0.75}"#).unwrap();

        let mut out = [0.0f32; 128];
        processor.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.75));
        assert_eq!(processor.take_messages_json(), r#"[{"type":"require_knobs","knobs":["amp"]}]"#);
        assert_eq!(processor.take_messages_json(), "[]");
    }

    #[test]
    fn compile_error_is_reported_not_returned() {
        let mut processor = SynthProcessor::new(48000.0);
        processor.post_message_json(r#"{"type":"shader_function","func":"return +"}"#).unwrap();
        let messages = processor.take_messages_json();
        assert!(messages.contains(r#""type":"error""#), "got {messages}");
        assert_eq!(processor.sample_rate(), 48000.0);
    }
}
