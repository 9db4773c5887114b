//! Threaded host for an `Engine`: the audio side of the control-plane channel.
//!
//! The audio callback owns an `EngineHost`. Each call to `process` drains the
//! inbound channel without blocking, applies everything as one batch, renders
//! the block and forwards any events to the UI side.

use crossbeam::channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::dsp::engine::Engine;
use crate::protocol::{ControlMessage, EngineEvent};

#[derive(Debug)]
pub struct EngineHost {
    engine: Engine,
    commands: Receiver<ControlMessage>,
    events: Sender<EngineEvent>,
    batch: Vec<ControlMessage>,
    block: Vec<f64>,
}

/// UI-side ends of the host's channels.
#[derive(Debug, Clone)]
pub struct HostLink {
    pub commands: Sender<ControlMessage>,
    pub events: Receiver<EngineEvent>,
}

/// Wrap `engine` in a host and return the channel ends the UI talks through.
pub fn connect(engine: Engine) -> (EngineHost, HostLink) {
    let (command_tx, command_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    let host = EngineHost {
        engine,
        commands: command_rx,
        events: event_tx,
        batch: Vec::new(),
        block: Vec::new(),
    };
    (host, HostLink { commands: command_tx, events: event_rx })
}

impl EngineHost {
    /// Apply pending messages, then render one block into `out`.
    pub fn process(&mut self, out: &mut [f32]) {
        self.batch.extend(self.commands.try_iter());
        if !self.batch.is_empty() {
            self.engine.apply_batch(self.batch.drain(..));
        }

        self.block.resize(out.len(), 0.0);
        self.engine.render_block(&mut self.block);
        for (dst, &src) in out.iter_mut().zip(self.block.iter()) {
            *dst = src as f32;
        }

        for event in self.engine.drain_events() {
            if self.events.send(event).is_err() {
                debug!("UI side of the engine channel is gone");
                break;
            }
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
}
