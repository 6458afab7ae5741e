/// Errors that can occur during frame encoding/decoding.
///
/// The first four variants describe corrupt data on the receive path; the
/// reassembler recovers from them by dropping its buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The first byte is not the head magic.
    #[error("bad head magic 0x{0:02X} (expected 0xA5)")]
    InvalidMagic(u8),

    /// The byte after the checksum is not the end magic.
    #[error("bad end magic 0x{0:02X} (expected 0x5A)")]
    InvalidEndMagic(u8),

    /// The length field is outside what a frame can carry.
    #[error("invalid frame length {length} (allowed {min}..={max})")]
    InvalidLength { length: u16, min: u16, max: usize },

    /// The received checksum does not match the recomputed one.
    #[error("crc16 mismatch: frame carries 0x{expected:04X}, computed 0x{computed:04X}")]
    ChecksumMismatch { expected: u16, computed: u16 },

    /// The payload does not fit in a frame.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A typed payload record was shorter than its wire size.
    #[error("{what} payload truncated ({actual} bytes, need {expected})")]
    TruncatedPayload {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl FrameError {
    /// True for errors that mean the received bytes cannot be a valid frame.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidMagic(_)
                | FrameError::InvalidEndMagic(_)
                | FrameError::InvalidLength { .. }
                | FrameError::ChecksumMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
