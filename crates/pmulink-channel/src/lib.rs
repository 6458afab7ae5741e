//! Protocol engine for the PMU serial link.
//!
//! A [`Channel`] combines the request tracker, the notification hub and the
//! send path. Blocking requests go through [`Channel::execute`] (or the typed
//! operations in [`ops`]); everything the peer sends on its own is offered to
//! registered [`Listener`]s and acknowledged when nobody claims it.

pub mod channel;
pub mod config;
pub mod error;
pub mod link;
pub mod monitor;
pub mod notify;
pub mod ops;
pub mod request;

pub use channel::{Channel, ReceiverHandle};
pub use config::ChannelConfig;
pub use error::{ChannelError, Result};
pub use link::{open, open_with_config, Link};
pub use monitor::{ShutdownListener, StatusMonitor};
pub use notify::{Disposition, Listener, ListenerId};
pub use ops::{ProbeInfo, VERSION_CAPACITY};
pub use request::{Reply, Request};
