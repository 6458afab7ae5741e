use bytes::{BufMut, Bytes, BytesMut};

use crate::address::Endpoint;
use crate::crc::{crc16, CRC16_INIT};
use crate::error::{FrameError, Result};

/// Header: magic (1) + source (1) + dest (1) + frame id (2) + length (2) + command (2).
pub const HEADER_SIZE: usize = 9;

/// Trailer: need-ack (1) + crc16 (2) + magic (1).
pub const TRAILER_SIZE: usize = 4;

/// First byte of every frame.
pub const MAGIC_HEAD: u8 = 0xA5;

/// Last byte of every frame.
pub const MAGIC_END: u8 = 0x5A;

/// Default bound on a whole frame, matching the reassembly buffer.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024;

/// Smallest frame: header and trailer around an empty payload.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + TRAILER_SIZE;

/// Smallest legal `length`: an empty payload.
const MIN_LENGTH: u16 = (TRAILER_SIZE - 1) as u16;

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sender address.
    pub source: u8,
    /// Receiver address.
    pub dest: u8,
    /// Request/reply correlation tag.
    pub frame_id: u16,
    /// Opcode.
    pub command: u16,
    /// Sender asks for a bare acknowledgment if nothing else answers.
    pub need_ack: bool,
    /// Command payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame addressed from `endpoint` to its peer.
    pub fn new(
        endpoint: Endpoint,
        frame_id: u16,
        command: u16,
        need_ack: bool,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            source: endpoint.address(),
            dest: endpoint.peer(),
            frame_id,
            command,
            need_ack,
            payload: payload.into(),
        }
    }

    /// Value of the header `length` field: payload plus trailer, minus one.
    pub fn length(&self) -> usize {
        self.payload.len() + TRAILER_SIZE - 1
    }

    /// Total bytes on the wire.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + TRAILER_SIZE
    }

    /// The trailer checksum for this frame.
    ///
    /// Covers the header after the magic byte, the payload, and the need-ack
    /// byte.
    pub fn checksum(&self) -> u16 {
        let mut head = [0u8; HEADER_SIZE - 1];
        head[0] = self.source;
        head[1] = self.dest;
        head[2..4].copy_from_slice(&self.frame_id.to_le_bytes());
        head[4..6].copy_from_slice(&(self.length() as u16).to_le_bytes());
        head[6..8].copy_from_slice(&self.command.to_le_bytes());

        let crc = crc16(CRC16_INIT, &head);
        let crc = crc16(crc, &self.payload);
        crc16(crc, &[u8::from(self.need_ack)])
    }
}

/// Outcome of decoding a complete frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A valid frame addressed to us.
    Frame(Frame),
    /// Well-formed header, but addressed to someone else.
    Ignored { source: u8, dest: u8 },
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────┬─────┬──────┬──────────┬──────────┬──────────┬─────────┬──────────┬──────────┬───────┐
/// │ 0xA5  │ src │ dest │ frame id │ length   │ command  │ payload │ need_ack │ crc16    │ 0x5A  │
/// │ (1B)  │(1B) │ (1B) │ (2B LE)  │ (2B LE)  │ (2B LE)  │         │ (1B)     │ (2B LE)  │ (1B)  │
/// └───────┴─────┴──────┴──────────┴──────────┴──────────┴─────────┴──────────┴──────────┴───────┘
/// ```
/// `length` counts the payload plus the trailer, minus one.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let max_payload = usize::from(u16::MAX) - usize::from(MIN_LENGTH);
    if frame.payload.len() > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: frame.payload.len(),
            max: max_payload,
        });
    }

    dst.reserve(frame.wire_size());
    let start = dst.len();
    dst.put_u8(MAGIC_HEAD);
    dst.put_u8(frame.source);
    dst.put_u8(frame.dest);
    dst.put_u16_le(frame.frame_id);
    dst.put_u16_le(frame.length() as u16);
    dst.put_u16_le(frame.command);
    dst.put_slice(&frame.payload);
    dst.put_u8(u8::from(frame.need_ack));
    let crc = crc16(CRC16_INIT, &dst[start + 1..]);
    dst.put_u16_le(crc);
    dst.put_u8(MAGIC_END);
    Ok(())
}

/// Decode the frame at the start of `src`.
///
/// Returns `Ok(None)` if `src` doesn't contain a complete frame yet, and an
/// error if the bytes cannot be a valid frame. The frame must fit within
/// `max_frame_size` bytes; a header announcing more is treated as corrupt so
/// the receive buffer never waits for data it could not hold.
pub fn decode_frame(src: &[u8], endpoint: Endpoint, max_frame_size: usize) -> Result<Option<Decoded>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0] != MAGIC_HEAD {
        return Err(FrameError::InvalidMagic(src[0]));
    }

    let source = src[1];
    let dest = src[2];
    if !endpoint.accepts(source, dest) {
        return Ok(Some(Decoded::Ignored { source, dest }));
    }

    let frame_id = u16::from_le_bytes([src[3], src[4]]);
    let length = u16::from_le_bytes([src[5], src[6]]);
    let command = u16::from_le_bytes([src[7], src[8]]);

    let max_length = max_frame_size.saturating_sub(HEADER_SIZE + 1);
    if length < MIN_LENGTH || usize::from(length) > max_length {
        return Err(FrameError::InvalidLength {
            length,
            min: MIN_LENGTH,
            max: max_length,
        });
    }

    let total = HEADER_SIZE + usize::from(length) + 1;
    if src.len() < total {
        return Ok(None);
    }

    let payload_end = total - TRAILER_SIZE;
    let trailer = &src[payload_end..total];
    if trailer[3] != MAGIC_END {
        return Err(FrameError::InvalidEndMagic(trailer[3]));
    }

    let expected = u16::from_le_bytes([trailer[1], trailer[2]]);
    let computed = crc16(CRC16_INIT, &src[1..=payload_end]);
    if expected != computed {
        return Err(FrameError::ChecksumMismatch { expected, computed });
    }

    Ok(Some(Decoded::Frame(Frame {
        source,
        dest,
        frame_id,
        command,
        need_ack: trailer[0] != 0,
        payload: Bytes::copy_from_slice(&src[HEADER_SIZE..payload_end]),
    })))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest frame accepted on either direction, header and trailer
    /// included. Values below [`MIN_FRAME_SIZE`] are raised to it.
    /// Default: 8 KiB.
    pub max_frame_size: usize,
}

impl FrameConfig {
    /// The effective frame bound, never smaller than an empty frame.
    pub fn frame_capacity(&self) -> usize {
        self.max_frame_size.max(MIN_FRAME_SIZE)
    }

    /// Largest payload a frame can carry under this configuration.
    pub fn max_payload_size(&self) -> usize {
        (self.frame_capacity() - MIN_FRAME_SIZE)
            .min(usize::from(u16::MAX) - usize::from(MIN_LENGTH))
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{ALL, HOST, HOST_BROADCAST, PMU};

    fn pmu_frame(frame_id: u16, command: u16, need_ack: bool, payload: &'static [u8]) -> Frame {
        Frame::new(Endpoint::Pmu, frame_id, command, need_ack, Bytes::from_static(payload))
    }

    fn encode(frame: &Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(frame, &mut buf).unwrap();
        buf
    }

    fn decode_host(buf: &[u8]) -> Result<Option<Decoded>> {
        decode_frame(buf, Endpoint::Host, DEFAULT_MAX_FRAME_SIZE)
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let frame = pmu_frame(0x1234, 0x07, true, b"status-bytes");
        let buf = encode(&frame);
        assert_eq!(buf.len(), frame.wire_size());

        let decoded = decode_host(&buf).unwrap().unwrap();
        assert_eq!(decoded, Decoded::Frame(frame.clone()));

        let wire_crc = u16::from_le_bytes([buf[buf.len() - 3], buf[buf.len() - 2]]);
        assert_eq!(wire_crc, frame.checksum());
    }

    #[test]
    fn test_known_wire_bytes() {
        let frame = Frame::new(Endpoint::Host, 1, 0x13, true, vec![30u8]);
        let buf = encode(&frame);

        assert_eq!(
            &buf[..HEADER_SIZE],
            &[0xA5, HOST, PMU, 0x01, 0x00, 0x04, 0x00, 0x13, 0x00]
        );
        assert_eq!(buf[HEADER_SIZE], 30);
        assert_eq!(buf[HEADER_SIZE + 1], 1);
        let crc = crc16(CRC16_INIT, &buf[1..HEADER_SIZE + 2]);
        assert_eq!(&buf[HEADER_SIZE + 2..HEADER_SIZE + 4], &crc.to_le_bytes());
        assert_eq!(buf[buf.len() - 1], MAGIC_END);
    }

    #[test]
    fn test_empty_payload() {
        let frame = pmu_frame(9, 0x08, false, b"");
        let buf = encode(&frame);
        assert_eq!(buf.len(), HEADER_SIZE + TRAILER_SIZE);
        assert_eq!(u16::from_le_bytes([buf[5], buf[6]]), 3);

        let Decoded::Frame(decoded) = decode_host(&buf).unwrap().unwrap() else {
            panic!("expected a frame");
        };
        assert!(decoded.payload.is_empty());
        assert!(!decoded.need_ack);
    }

    #[test]
    fn test_decode_incomplete_header() {
        let buf = [MAGIC_HEAD, PMU, HOST];
        assert!(decode_host(&buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_incomplete_body() {
        let buf = encode(&pmu_frame(3, 0x04, false, b"v1.2"));
        for cut in HEADER_SIZE..buf.len() {
            assert!(decode_host(&buf[..cut]).unwrap().is_none(), "cut at {cut}");
        }
    }

    #[test]
    fn test_decode_invalid_magic() {
        let mut buf = encode(&pmu_frame(3, 0x04, false, b""));
        buf[0] = 0x00;
        assert_eq!(decode_host(&buf), Err(FrameError::InvalidMagic(0x00)));
    }

    #[test]
    fn test_decode_invalid_end_magic() {
        let mut buf = encode(&pmu_frame(3, 0x04, false, b"x"));
        let last = buf.len() - 1;
        buf[last] = 0x00;
        assert_eq!(decode_host(&buf), Err(FrameError::InvalidEndMagic(0x00)));
    }

    #[test]
    fn test_decode_length_below_trailer() {
        let mut buf = encode(&pmu_frame(3, 0x04, false, b""));
        buf[5] = 2;
        assert!(matches!(
            decode_host(&buf),
            Err(FrameError::InvalidLength { length: 2, .. })
        ));
    }

    #[test]
    fn test_decode_length_beyond_buffer() {
        let mut buf = encode(&pmu_frame(3, 0x04, false, b""));
        buf[5..7].copy_from_slice(&0x2000u16.to_le_bytes());
        assert!(matches!(
            decode_host(&buf),
            Err(FrameError::InvalidLength { length: 0x2000, .. })
        ));
    }

    #[test]
    fn test_largest_frame_fits_exactly() {
        let max_frame_size = 64;
        let payload = vec![0x55; max_frame_size - HEADER_SIZE - TRAILER_SIZE];
        let buf = encode(&Frame::new(Endpoint::Pmu, 1, 0x07, false, payload));
        assert_eq!(buf.len(), max_frame_size);
        assert!(matches!(
            decode_frame(&buf, Endpoint::Host, max_frame_size),
            Ok(Some(Decoded::Frame(_)))
        ));
        assert!(matches!(
            decode_frame(&buf, Endpoint::Host, max_frame_size - 1),
            Err(FrameError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut buf = encode(&pmu_frame(3, 0x04, false, b"abc"));
        buf[HEADER_SIZE] ^= 0x01;
        assert!(matches!(
            decode_host(&buf),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_every_single_byte_flip_is_corrupt() {
        let buf = encode(&pmu_frame(0x0102, 0x07, true, b"\x10\x0e\x30\x14"));
        // Skip the address bytes: a flip there turns the frame into someone
        // else's traffic instead of corrupt data.
        for index in (0..buf.len()).filter(|i| *i != 1 && *i != 2) {
            for bit in 0..8 {
                let mut damaged = buf.clone();
                damaged[index] ^= 1 << bit;
                match decode_host(&damaged) {
                    Err(err) => assert!(err.is_corrupt()),
                    Ok(None) => {
                        // A flip in the length field can ask for more bytes.
                        assert!(index == 5 || index == 6, "byte {index} bit {bit}");
                    }
                    Ok(Some(decoded)) => panic!("byte {index} bit {bit} decoded as {decoded:?}"),
                }
            }
        }
    }

    #[test]
    fn test_foreign_addressing_is_ignored() {
        let frame = Frame::new(Endpoint::Host, 5, 0x01, true, Bytes::new());
        let buf = encode(&frame);
        assert_eq!(
            decode_host(&buf).unwrap(),
            Some(Decoded::Ignored {
                source: HOST,
                dest: PMU
            })
        );
    }

    #[test]
    fn test_broadcasts_are_accepted() {
        for dest in [HOST_BROADCAST, ALL] {
            let mut frame = pmu_frame(5, 0x07, true, b"");
            frame.dest = dest;
            let buf = encode(&frame);
            assert!(matches!(decode_host(&buf), Ok(Some(Decoded::Frame(_)))));
        }
    }

    #[test]
    fn test_trailing_bytes_are_not_part_of_frame() {
        let frame = pmu_frame(7, 0x06, false, b"fw");
        let mut buf = encode(&frame);
        buf.extend_from_slice(&[0xA5, 0x81]);
        assert_eq!(decode_host(&buf).unwrap(), Some(Decoded::Frame(frame)));
    }

    #[test]
    fn test_frame_config_payload_bound() {
        let config = FrameConfig::default();
        assert_eq!(
            config.max_payload_size(),
            DEFAULT_MAX_FRAME_SIZE - HEADER_SIZE - TRAILER_SIZE
        );
    }

    #[test]
    fn test_frame_config_never_below_empty_frame() {
        let config = FrameConfig { max_frame_size: 6 };
        assert_eq!(config.frame_capacity(), MIN_FRAME_SIZE);
        assert_eq!(config.max_payload_size(), 0);
    }
}
