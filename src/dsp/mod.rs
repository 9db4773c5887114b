//! Real-time side of the engine.
//!
//! Everything here runs inside the audio callback or next to it: the
//! per-session stores, the interpreter and the engine loop. The same code
//! drives the AudioWorklet (via WASM) and the offline WAV renderer.

pub mod engine;
pub mod interpreter;
pub mod knobs;
pub mod notes;
pub mod renderer;
pub mod state;
