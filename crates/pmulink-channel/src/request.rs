use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use pmulink_frame::{command_name, reply_command, Frame};
use tracing::debug;

/// A blocking request to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub(crate) command: u16,
    pub(crate) expect: u16,
    pub(crate) payload: Bytes,
    pub(crate) frame_id: Option<u16>,
}

impl Request {
    /// A request for `command`, answered by `command + 1`.
    pub fn new(command: impl Into<u16>) -> Self {
        let command = command.into();
        Self {
            command,
            expect: reply_command(command),
            payload: Bytes::new(),
            frame_id: None,
        }
    }

    /// Override the reply opcode.
    pub fn expect_reply(mut self, command: impl Into<u16>) -> Self {
        self.expect = command.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Use a fixed frame id instead of the next one from the channel counter.
    pub fn with_frame_id(mut self, frame_id: u16) -> Self {
        self.frame_id = Some(frame_id);
        self
    }

    pub fn command(&self) -> u16 {
        self.command
    }

    pub fn expected_reply(&self) -> u16 {
        self.expect
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// The frame that answered a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub frame: Frame,
}

impl Reply {
    pub fn payload(&self) -> &[u8] {
        &self.frame.payload
    }

    pub fn command(&self) -> u16 {
        self.frame.command
    }

    pub fn frame_id(&self) -> u16 {
        self.frame.frame_id
    }

    pub fn into_payload(self) -> Bytes {
        self.frame.payload
    }
}

struct Pending {
    frame_id: u16,
    expect: u16,
    done: SyncSender<Frame>,
}

/// The single outstanding-request slot shared by callers and the receive path.
#[derive(Default)]
pub(crate) struct RequestTracker {
    slot: Mutex<Option<Pending>>,
}

impl RequestTracker {
    /// Install the outstanding request and return its completion signal.
    pub(crate) fn arm(&self, frame_id: u16, expect: u16) -> Receiver<Frame> {
        let (done, signal) = mpsc::sync_channel(1);
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Pending {
            frame_id,
            expect,
            done,
        });
        signal
    }

    /// Clear the slot after a failed request.
    pub(crate) fn disarm(&self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Hand `frame` to the outstanding request if it is the awaited reply.
    ///
    /// Returns the frame back when it does not match.
    pub(crate) fn complete(&self, frame: Frame) -> Option<Frame> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pending) = slot.as_ref() else {
            return Some(frame);
        };

        if pending.frame_id != frame.frame_id || pending.expect != frame.command {
            debug!(
                awaiting_id = pending.frame_id,
                awaiting = command_name(pending.expect),
                frame_id = frame.frame_id,
                command = command_name(frame.command),
                "frame does not match outstanding request"
            );
            return Some(frame);
        }

        let Some(pending) = slot.take() else {
            return Some(frame);
        };

        debug!(frame_id = frame.frame_id, command = frame.command, "reply matched");
        // Still under the slot lock: a requester that disarms after this
        // finds the frame in its signal.
        let _ = pending.done.try_send(frame);
        None
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
