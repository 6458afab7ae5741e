use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use bytes::{Bytes, BytesMut};
use pmulink_frame::{
    command_name, encode_frame, reply_command, Assembled, Frame, FrameError, Reassembler,
};
use pmulink_transport::{Transport, TransportError};
use tracing::{debug, trace, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::notify::{Disposition, Listener, ListenerId, NotificationHub};
use crate::request::{Reply, Request, RequestTracker};

const READ_CHUNK_SIZE: usize = 512;

/// One side of a PMU link.
///
/// Callers on any thread use [`send`](Self::send), [`execute`](Self::execute)
/// and the convenience wrappers; a single receive path feeds incoming bytes
/// through [`receive`](Self::receive), usually via
/// [`spawn_receiver`](Self::spawn_receiver). Share the channel with `Arc`.
pub struct Channel {
    config: ChannelConfig,
    sender: Mutex<Box<dyn Transport>>,
    next_frame_id: AtomicU16,
    execute_lock: Mutex<()>,
    tracker: RequestTracker,
    hub: NotificationHub,
    reassembler: Mutex<Reassembler>,
}

impl Channel {
    /// Create a host-side channel writing to `transport` with default configuration.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_config(transport, ChannelConfig::default())
    }

    pub fn with_config(transport: impl Transport + 'static, config: ChannelConfig) -> Self {
        let reassembler = Reassembler::with_config(config.endpoint, config.frame.clone());
        Self {
            sender: Mutex::new(Box::new(transport)),
            next_frame_id: AtomicU16::new(0),
            execute_lock: Mutex::new(()),
            tracker: RequestTracker::default(),
            hub: NotificationHub::default(),
            reassembler: Mutex::new(reassembler),
            config,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Fire-and-forget: send `command` with a fresh frame id and no ack
    /// request. Returns the frame id used.
    pub fn send(&self, command: impl Into<u16>, payload: impl Into<Bytes>) -> Result<u16> {
        let frame_id = self.next_frame_id();
        let frame = Frame::new(self.config.endpoint, frame_id, command.into(), false, payload);
        self.send_frame(&frame)?;
        Ok(frame_id)
    }

    /// Send `request` with `need_ack` set and block until the matching reply
    /// arrives, resending the identical frame on each timeout.
    ///
    /// Requests are serialized: a second caller waits until the first one
    /// returns. Must not be called from a [`Listener`] callback.
    pub fn execute(&self, request: Request) -> Result<Reply> {
        let _serial = self
            .execute_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let frame_id = request.frame_id.unwrap_or_else(|| self.next_frame_id());
        let command = request.command;
        let frame = Frame::new(self.config.endpoint, frame_id, command, true, request.payload);
        let wire = self.encode(&frame)?;

        let signal = self.tracker.arm(frame_id, request.expect);
        let attempts = self.config.attempts();
        for attempt in 1..=attempts {
            debug!(
                frame_id,
                command = command_name(command),
                attempt,
                "sending request"
            );
            if let Err(err) = self.write_wire(&wire) {
                self.tracker.disarm();
                return Err(err.into());
            }

            match signal.recv_timeout(self.config.reply_timeout) {
                Ok(frame) => return Ok(Reply { frame }),
                Err(RecvTimeoutError::Timeout) => {
                    debug!(frame_id, attempt, "no reply yet");
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.tracker.disarm();
                    return Err(ChannelError::Disconnected);
                }
            }
        }

        self.tracker.disarm();
        // A reply matched between the last wait and the disarm.
        if let Ok(frame) = signal.try_recv() {
            return Ok(Reply { frame });
        }
        warn!(
            frame_id,
            command = command_name(command),
            attempts,
            "request timed out"
        );
        Err(ChannelError::Timeout {
            frame_id,
            command,
            attempts,
        })
    }

    /// Send `payload` and wait for the ack of `command`, discarding any reply
    /// payload.
    pub fn write_data(&self, command: impl Into<u16>, payload: impl Into<Bytes>) -> Result<()> {
        self.execute(Request::new(command).with_payload(payload))
            .map(|_| ())
    }

    /// Send `command` and read the reply payload as text.
    ///
    /// The text ends at the first NUL byte and is cut to `capacity - 1` bytes,
    /// like a NUL-terminated buffer of `capacity` bytes. An empty reply gives
    /// an empty string.
    pub fn read_string(&self, command: impl Into<u16>, capacity: usize) -> Result<String> {
        let reply = self.execute(Request::new(command))?;
        let payload = reply.payload();
        let end = payload
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(payload.len())
            .min(capacity.saturating_sub(1));
        Ok(String::from_utf8_lossy(&payload[..end]).into_owned())
    }

    /// Send a one-byte payload and wait for the ack.
    pub fn write_u8(&self, command: impl Into<u16>, value: u8) -> Result<()> {
        self.write_data(command, vec![value])
    }

    /// Answer a received frame with `command + 1`, its frame id, and no ack
    /// request.
    pub fn respond(&self, request: &Frame, payload: impl Into<Bytes>) -> Result<()> {
        let reply = Frame::new(
            self.config.endpoint,
            request.frame_id,
            reply_command(request.command),
            false,
            payload,
        );
        self.send_frame(&reply)
    }

    /// Encode and write one frame under the send lock.
    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        let wire = self.encode(frame)?;
        self.write_wire(&wire).map_err(Into::into)
    }

    /// Feed bytes from the link. Returns how many bytes were taken; the rest
    /// did not fit in the reassembly buffer and should be offered again.
    pub fn receive(&self, data: &[u8]) -> usize {
        trace!(len = data.len(), "received chunk");
        let (consumed, outcome) = self
            .reassembler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data);

        if let Assembled::Frame(frame) = outcome {
            self.route(frame);
        }
        consumed
    }

    /// Register a listener for unsolicited frames. The channel keeps only a
    /// weak reference.
    pub fn register<L: Listener + 'static>(&self, listener: &Arc<L>) -> ListenerId {
        self.hub.register(listener)
    }

    /// Returns false if the listener was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        self.hub.unregister(id)
    }

    /// Number of live registered listeners.
    pub fn listener_count(&self) -> usize {
        self.hub.len()
    }

    /// Start a thread that reads `reader` and feeds [`receive`](Self::receive)
    /// until end of stream, a read error, or [`ReceiverHandle::stop`].
    ///
    /// Give socket readers a read timeout so a stop request is noticed while
    /// the link is idle.
    pub fn spawn_receiver<R>(self: &Arc<Self>, mut reader: R) -> Result<ReceiverHandle>
    where
        R: Read + Send + 'static,
    {
        let channel = Arc::clone(self);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("pmulink-rx".to_string())
            .spawn(move || {
                let mut chunk = [0u8; READ_CHUNK_SIZE];
                while !stop_flag.load(Ordering::Acquire) {
                    let read = match reader.read(&mut chunk) {
                        Ok(0) => {
                            debug!("link reached end of stream");
                            return Err(ChannelError::Disconnected);
                        }
                        Ok(n) => n,
                        Err(err)
                            if matches!(
                                err.kind(),
                                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                            ) =>
                        {
                            continue
                        }
                        Err(err) => return Err(TransportError::Io(err).into()),
                    };

                    let mut offset = 0;
                    while offset < read {
                        let consumed = channel.receive(&chunk[offset..read]);
                        if consumed == 0 {
                            break;
                        }
                        offset += consumed;
                    }
                }
                debug!("receiver stopped");
                Ok(())
            })
            .map_err(TransportError::Io)?;

        Ok(ReceiverHandle {
            stop,
            thread: Some(thread),
        })
    }

    fn route(&self, frame: Frame) {
        let Some(frame) = self.tracker.complete(frame) else {
            return;
        };

        if self.hub.dispatch(&frame) == Disposition::Handled || !frame.need_ack {
            return;
        }

        debug!(
            frame_id = frame.frame_id,
            command = command_name(frame.command),
            "auto-acknowledging unhandled frame"
        );
        if let Err(err) = self.respond(&frame, Bytes::new()) {
            warn!(error = %err, frame_id = frame.frame_id, "failed to send auto-ack");
        }
    }

    fn next_frame_id(&self) -> u16 {
        self.next_frame_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    fn encode(&self, frame: &Frame) -> Result<BytesMut> {
        let max = self.config.frame.max_payload_size();
        if frame.payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max,
            }
            .into());
        }
        let mut wire = BytesMut::with_capacity(frame.wire_size());
        encode_frame(frame, &mut wire)?;
        Ok(wire)
    }

    fn write_wire(&self, wire: &[u8]) -> std::result::Result<(), TransportError> {
        let mut sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        sender.write_all_bytes(wire)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to a receive thread started by [`Channel::spawn_receiver`].
pub struct ReceiverHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl ReceiverHandle {
    /// Ask the thread to stop after its current read.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.thread
            .as_ref()
            .map_or(true, |thread| thread.is_finished())
    }

    /// Wait for the thread and return how it ended.
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or(Err(ChannelError::Disconnected)),
            None => Ok(()),
        }
    }
}
