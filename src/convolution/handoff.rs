use crate::convolution::{PublishMode, PublishStatus};
use crate::error::{AuralisError, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};

/// Single-slot handoff of owned values from the update thread to the render thread.
pub fn handoff<T: Send>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (sender, receiver) = crossbeam_channel::bounded(1);
    (HandoffSender { sender }, HandoffReceiver { receiver })
}

pub struct HandoffSender<T> {
    sender: Sender<T>,
}

impl<T: Send> HandoffSender<T> {
    /// Places `value` in the slot.
    ///
    /// A blocking send waits until the receiver takes the pending value, and fails once
    /// the receiver is gone.
    pub fn publish(&self, value: T, mode: PublishMode) -> Result<PublishStatus> {
        match mode {
            PublishMode::Blocking => self
                .sender
                .send(value)
                .map(|_| PublishStatus::Published)
                .map_err(|_| AuralisError::Convolution("Convolution processor is gone".into())),
            PublishMode::NonBlocking => match self.sender.try_send(value) {
                Ok(()) => Ok(PublishStatus::Published),
                Err(TrySendError::Full(_)) => Ok(PublishStatus::InputFull),
                Err(TrySendError::Disconnected(_)) => Err(AuralisError::Convolution(
                    "Convolution processor is gone".into(),
                )),
            },
        }
    }

    pub fn is_pending(&self) -> bool {
        self.sender.is_full()
    }
}

pub struct HandoffReceiver<T> {
    receiver: Receiver<T>,
}

impl<T: Send> HandoffReceiver<T> {
    /// Takes the pending value, if any. Never blocks.
    pub fn take_latest(&self) -> Option<T> {
        let mut latest = None;
        loop {
            match self.receiver.try_recv() {
                Ok(value) => latest = Some(value),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return latest,
            }
        }
    }
}
