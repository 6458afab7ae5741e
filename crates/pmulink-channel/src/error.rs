use std::time::Duration;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error while writing or reading the link.
    #[error("transport error: {0}")]
    Transport(#[from] pmulink_transport::TransportError),

    /// Frame-level error (encoding an outbound frame or decoding a payload).
    #[error("frame error: {0}")]
    Frame(#[from] pmulink_frame::FrameError),

    /// No matching reply after every attempt.
    #[error(
        "no reply to {} (0x{command:02X}) frame {frame_id} after {attempts} attempts",
        pmulink_frame::command_name(*command)
    )]
    Timeout {
        frame_id: u16,
        command: u16,
        attempts: u32,
    },

    /// The link reached end of stream.
    #[error("link disconnected")]
    Disconnected,

    /// No status report arrived in time.
    #[error("no status report within {0:?}")]
    NoReport(Duration),
}

impl ChannelError {
    /// True if the peer simply did not answer.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChannelError::Timeout { .. } | ChannelError::NoReport(_))
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
