//! Outbox that buffers control messages until the engine channel exists.

use std::collections::VecDeque;

use crossbeam::channel::Sender;
use tracing::{debug, warn};

use crate::protocol::ControlMessage;

#[derive(Debug)]
pub enum Port {
    /// Engine not started yet; messages wait here in order.
    Buffering(VecDeque<ControlMessage>),
    Connected(Sender<ControlMessage>),
}

impl Default for Port {
    fn default() -> Self {
        Port::Buffering(VecDeque::new())
    }
}

impl Port {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post_message(&mut self, message: ControlMessage) {
        match self {
            Port::Buffering(queue) => queue.push_back(message),
            Port::Connected(sender) => {
                if sender.send(message).is_err() {
                    warn!("Engine channel closed, dropping control message");
                }
            }
        }
    }

    /// Switch to `sender`, flushing buffered messages first and in order.
    pub fn connect(&mut self, sender: Sender<ControlMessage>) {
        let previous = std::mem::replace(self, Port::Connected(sender));
        if let Port::Buffering(queue) = previous {
            debug!("Port connected, flushing {} queued messages", queue.len());
            for message in queue {
                self.post_message(message);
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Port::Connected(_))
    }

    /// Messages still waiting for a connection.
    pub fn pending(&self) -> usize {
        match self {
            Port::Buffering(queue) => queue.len(),
            Port::Connected(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn buffers_until_connected_then_flushes_in_order() {
        let mut port = Port::new();
        port.post_message(ControlMessage::ShaderFunction { func: "return 0".into() });
        port.post_message(ControlMessage::UpdateKnob { name: "a".into(), value: 0.2 });
        assert_eq!(port.pending(), 2);
        assert!(!port.is_connected());

        let (tx, rx) = unbounded();
        port.connect(tx);
        port.post_message(ControlMessage::LowerUsage);

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![
                ControlMessage::ShaderFunction { func: "return 0".into() },
                ControlMessage::UpdateKnob { name: "a".into(), value: 0.2 },
                ControlMessage::LowerUsage,
            ]
        );
        assert_eq!(port.pending(), 0);
    }

    #[test]
    fn closed_channel_does_not_panic() {
        let mut port = Port::new();
        let (tx, rx) = unbounded();
        port.connect(tx);
        drop(rx);
        port.post_message(ControlMessage::LowerUsage);
        assert!(port.is_connected());
    }
}
