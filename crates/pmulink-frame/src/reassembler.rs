use bytes::BytesMut;
use tracing::{debug, trace, warn};

use crate::address::Endpoint;
use crate::codec::{decode_frame, Decoded, Frame, FrameConfig};
use crate::error::FrameError;

/// Result of feeding bytes to a [`Reassembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    /// The buffer holds a partial frame; more bytes are needed.
    Pending,
    /// A complete frame addressed to us.
    Frame(Frame),
    /// A complete frame addressed to someone else; it was dropped.
    Ignored { source: u8, dest: u8 },
    /// The buffer could not be a valid frame and was dropped.
    Corrupt(FrameError),
}

/// Accumulates receive chunks into one bounded buffer until a frame resolves.
///
/// Each resolution (frame, ignored or corrupt) empties the buffer. Bytes that
/// arrive after a complete frame in the same chunk are dropped with it, and
/// bytes beyond capacity are never buffered.
pub struct Reassembler {
    endpoint: Endpoint,
    buf: BytesMut,
    capacity: usize,
}

impl Reassembler {
    /// Create a reassembler for `endpoint` with default configuration.
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_config(endpoint, FrameConfig::default())
    }

    /// Create a reassembler whose buffer holds one maximum-size frame.
    pub fn with_config(endpoint: Endpoint, config: FrameConfig) -> Self {
        let capacity = config.frame_capacity();
        Self {
            endpoint,
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `data` and try to decode the buffered bytes.
    ///
    /// Returns how many bytes of `data` were taken into the buffer together
    /// with the outcome.
    pub fn push(&mut self, data: &[u8]) -> (usize, Assembled) {
        let room = self.capacity - self.buf.len();
        let taken = data.len().min(room);
        if taken < data.len() {
            debug!(
                dropped = data.len() - taken,
                capacity = self.capacity,
                "receive buffer full, dropping bytes"
            );
        }
        self.buf.extend_from_slice(&data[..taken]);

        let outcome = match decode_frame(&self.buf, self.endpoint, self.capacity) {
            Ok(None) => return (taken, Assembled::Pending),
            Ok(Some(Decoded::Frame(frame))) => {
                trace!(
                    frame_id = frame.frame_id,
                    command = frame.command,
                    len = frame.payload.len(),
                    "frame received"
                );
                Assembled::Frame(frame)
            }
            Ok(Some(Decoded::Ignored { source, dest })) => {
                trace!(source, dest, "frame not addressed to us");
                Assembled::Ignored { source, dest }
            }
            Err(err) => {
                match err {
                    FrameError::ChecksumMismatch { .. } => warn!(error = %err, "dropping frame"),
                    _ => debug!(error = %err, buffered = self.buf.len(), "dropping corrupt data"),
                }
                Assembled::Corrupt(err)
            }
        };

        self.buf.clear();
        (taken, outcome)
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop any buffered bytes.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}
