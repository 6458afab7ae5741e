//! Wire format of the PMU serial protocol.
//!
//! Every message on the link is one frame:
//! - a 9-byte header: magic `0xA5`, source, destination, frame id, length, command
//! - the command payload
//! - a 4-byte trailer: need-ack flag, CRC16, magic `0x5A`
//!
//! Multi-byte fields are little-endian. The [`Reassembler`] turns the raw
//! receive stream back into frames, one resolved frame per buffer fill.

pub mod address;
pub mod codec;
pub mod command;
pub mod crc;
pub mod error;
pub mod payload;
pub mod reassembler;

pub use address::{Endpoint, ALL, HOST, HOST_BROADCAST, PMU, PMU_BROADCAST};
pub use codec::{
    decode_frame, encode_frame, Decoded, Frame, FrameConfig, DEFAULT_MAX_FRAME_SIZE,
    HEADER_SIZE, MAGIC_END, MAGIC_HEAD, MIN_FRAME_SIZE, TRAILER_SIZE,
};
pub use command::{command_name, reply_command, PmuCommand};
pub use crc::{crc16, CRC16_INIT};
pub use error::{FrameError, Result};
pub use payload::{
    BootReason, DateTime, LedSetup, ShutdownReason, StartupTime, StatusReport, WatchdogTimeouts,
    WirePayload,
};
pub use reassembler::{Assembled, Reassembler};
