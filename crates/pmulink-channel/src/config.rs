use std::time::Duration;

use pmulink_frame::{Endpoint, FrameConfig};

/// Configuration for a [`Channel`](crate::Channel).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Which side of the link this channel speaks for.
    pub endpoint: Endpoint,
    /// How long each attempt of a request waits for its reply.
    pub reply_timeout: Duration,
    /// Resends after the first attempt before a request times out.
    pub max_retries: u32,
    /// Frame size bounds for encoding and reassembly.
    pub frame: FrameConfig,
}

impl ChannelConfig {
    /// Total send attempts per request.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Default configuration for the given side of the link.
    pub fn for_endpoint(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Host,
            reply_timeout: Duration::from_secs(1),
            max_retries: 3,
            frame: FrameConfig::default(),
        }
    }
}
