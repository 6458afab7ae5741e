//! Host-side protocol engine for a serial-attached power-management unit.
//!
//! The PMU sits on a UART next to the host processor. It reports battery and
//! charger telemetry, keeps a real-time clock, runs a watchdog, drives status
//! LEDs, and asks the host to shut down when power runs out. pmulink speaks its
//! framed request/reply protocol.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte-stream link (device node or Unix socket)
//! - [`frame`]: Wire format, CRC16, typed payload records, receive reassembly
//! - [`channel`]: Request/reply correlation, event listeners, typed PMU operations
//!
//! ```no_run
//! use pmulink::channel::{open, StatusMonitor};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let link = open("/dev/ttyS4")?;
//! let monitor = Arc::new(StatusMonitor::new());
//! link.register(&monitor);
//!
//! println!("firmware {}", link.firmware_version()?);
//! let report = monitor.wait_for_report(Duration::from_secs(5))?;
//! println!("battery {} mV", report.battery_millivolt);
//! # Ok::<(), pmulink::channel::ChannelError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use pmulink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pmulink_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use pmulink_channel::*;
}
