pub mod ast;
pub mod compiler;
pub mod config;
pub mod dsp;
pub mod error;
pub mod host;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod port;
pub mod protocol;
pub mod surface;
pub mod token;
pub mod value;
pub mod worklet;

pub use crate::config::{EngineConfig, KnobPolicy, StatePolicy};
pub use crate::dsp::engine::{Engine, EnginePhase, EngineStats, FaultRecord};
pub use crate::error::{CompileError, ProtocolError, RenderError, RuntimeFault};
pub use crate::loader::{load, parse, SampleFunction};
pub use crate::protocol::{ControlMessage, EngineEvent};

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the audioshader-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: compile a snippet and render it to a mono WAV byte array.
#[wasm_bindgen]
pub fn render_snippet_wav(source: &str, sample_rate: u32, seconds: f64) -> Result<Vec<u8>, JsValue> {
    dsp::renderer::render_wav(source, sample_rate, seconds).map_err(|e| JsValue::from_str(&e.render(source)))
}

/// WASM-exposed: compile a snippet and render it to mono f32 samples.
#[wasm_bindgen]
pub fn render_snippet_samples(source: &str, sample_rate: u32, seconds: f64) -> Result<Vec<f32>, JsValue> {
    let config = EngineConfig::with_sample_rate(f64::from(sample_rate));
    let samples = dsp::renderer::render_samples(source, config, seconds)
        .map_err(|e| JsValue::from_str(&e.render(source)))?;
    Ok(samples.iter().map(|&s| s as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_manifest() {
        assert_eq!(core_version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn continuity_across_edits() {
        let mut engine = Engine::default();
        let phase = "this.phase += 440 / sampleRate\nreturn Math.sin(2 * Math.PI * this.phase)";
        engine.load(phase).unwrap();
        let before = engine.render(1000);
        // Same accumulator, different waveform.
        engine.load("this.phase += 440 / sampleRate\nreturn this.phase % 1 < 0.5 ? 0.3 : -0.3").unwrap();
        engine.render(1);
        let phase_now = engine.state().get("phase").to_number();
        assert!((phase_now - 1001.0 * 440.0 / 44100.0).abs() < 1e-9);
        assert_eq!(before.len(), 1000);
    }
}
