//! Event types reported by the engine's threads

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Capacity of the event channel; events beyond it are dropped rather than blocking a thread.
pub(crate) const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The render thread handed its first block to the device.
    RenderStarted,
    /// Output conversion clipped `samples` samples in block `block`.
    Clipping { block: u64, samples: usize },
    /// A fresh set of impulse responses reached the convolution engine.
    ResponsesPublished { generation: u64 },
    /// Regeneration or publishing failed; the previous responses stay in use.
    UpdateFailed { error: String },
    /// The render thread hit a fatal error and halted.
    RenderFailed { error: String },
    EngineStopped,
}

impl EngineEvent {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::UpdateFailed { .. } | Self::RenderFailed { .. }
        )
    }
}

/// Sending half cloned into each engine thread.
#[derive(Clone)]
pub(crate) struct EventSink {
    sender: Sender<EngineEvent>,
}

impl EventSink {
    pub(crate) fn channel() -> (Self, Receiver<EngineEvent>) {
        let (sender, receiver) = crossbeam_channel::bounded(EVENT_CAPACITY);
        (Self { sender }, receiver)
    }

    /// Never blocks; a full or abandoned channel drops the event.
    pub(crate) fn emit(&self, event: EngineEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::debug!("Event channel full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_drops_when_full() {
        let (sink, receiver) = EventSink::channel();
        for _ in 0..EVENT_CAPACITY + 10 {
            sink.emit(EngineEvent::RenderStarted);
        }
        assert_eq!(receiver.try_iter().count(), EVENT_CAPACITY);
    }

    #[test]
    fn error_classification() {
        assert!(EngineEvent::RenderFailed { error: "x".into() }.is_error());
        assert!(!EngineEvent::Clipping { block: 0, samples: 1 }.is_error());
    }
}
