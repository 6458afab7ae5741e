use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pmulink_transport::LinkStream;
use tracing::debug;

use crate::channel::{Channel, ReceiverHandle};
use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};

/// How often an idle socket receiver checks for a stop request.
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A channel bound to a live link, with its receive thread running.
pub struct Link {
    channel: Arc<Channel>,
    receiver: ReceiverHandle,
}

/// Open the link at `path` (device node or Unix socket) as the host side.
pub fn open(path: impl AsRef<Path>) -> Result<Link> {
    open_with_config(path, ChannelConfig::default())
}

/// Open with explicit configuration.
pub fn open_with_config(path: impl AsRef<Path>, config: ChannelConfig) -> Result<Link> {
    let path = path.as_ref();
    let stream = LinkStream::open(path)?;
    debug!(?path, kind = stream.kind(), "link opened");
    Link::from_stream(stream, config)
}

impl Link {
    /// Start a channel over an already connected stream.
    pub fn from_stream(stream: LinkStream, config: ChannelConfig) -> Result<Self> {
        stream.set_read_timeout(Some(RECEIVE_POLL_INTERVAL))?;
        let reader = stream.try_clone()?;
        let channel = Arc::new(Channel::with_config(stream, config));
        let receiver = channel.spawn_receiver(reader)?;
        Ok(Self { channel, receiver })
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Whether the receive thread has exited (peer gone or read error).
    pub fn is_closed(&self) -> bool {
        self.receiver.is_finished()
    }

    /// Stop the receive thread and wait for it. A peer that already hung up
    /// is not an error.
    ///
    /// On a device node the thread only notices the request after its
    /// current read returns.
    pub fn close(self) -> Result<()> {
        self.receiver.stop();
        match self.receiver.join() {
            Err(ChannelError::Disconnected) => Ok(()),
            other => other,
        }
    }
}

impl std::ops::Deref for Link {
    type Target = Channel;

    fn deref(&self) -> &Channel {
        &self.channel
    }
}
