//! Byte-stream link abstraction for the PMU channel.
//!
//! The protocol engine only needs two things from the physical link: a way to
//! write a complete frame, and a byte source to feed its receive path. This
//! crate provides both:
//! - [`Transport`], the write seam the channel serializes frames through
//! - [`LinkStream`], a connected link over a serial device node or a Unix socket
//!
//! Configuring the serial line itself (baud rate, parity, flow control) is left
//! to the host.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::{LinkStream, Transport};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
