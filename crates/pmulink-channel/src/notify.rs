//! Event dispatch for frames that are not replies to an outstanding request.
//!
//! Listeners are consulted in registration order; the first one returning
//! [`Disposition::Handled`] stops the dispatch. The hub holds listeners
//! weakly: dropping the last `Arc` of a listener unregisters it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use pmulink_frame::Frame;
use tracing::trace;

/// Whether a listener took ownership of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The listener answered or consumed the frame; no auto-ack is sent.
    Handled,
    NotHandled,
}

/// A consumer of unsolicited frames (events, telemetry, peer requests).
///
/// Callbacks run on the receive thread. They may call `send`, `respond` and
/// the other non-blocking channel methods, but must not block on `execute`:
/// the reply could only be delivered by the thread they are blocking.
pub trait Listener: Send + Sync {
    /// Called with the frame's command as the event code.
    fn on_frame(&self, event: u16, frame: &Frame) -> Disposition;
}

impl<F> Listener for F
where
    F: Fn(u16, &Frame) -> Disposition + Send + Sync,
{
    fn on_frame(&self, event: u16, frame: &Frame) -> Disposition {
        self(event, frame)
    }
}

/// Registration handle returned by [`Channel::register`](crate::Channel::register).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    listener: Weak<dyn Listener>,
}

#[derive(Default)]
pub(crate) struct NotificationHub {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Registration>>,
}

impl NotificationHub {
    pub(crate) fn register<L: Listener + 'static>(&self, listener: &Arc<L>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listener: Weak<dyn Listener> = Arc::<L>::downgrade(listener);
        self.lock().push(Registration { id, listener });
        id
    }

    /// Returns false if `id` was not registered (or its listener was dropped
    /// and already pruned).
    pub(crate) fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|registration| registration.id != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        let mut listeners = self.lock();
        listeners.retain(|registration| registration.listener.strong_count() > 0);
        listeners.len()
    }

    /// Offer `frame` to each live listener until one handles it.
    pub(crate) fn dispatch(&self, frame: &Frame) -> Disposition {
        let snapshot: Vec<Arc<dyn Listener>> = {
            let mut listeners = self.lock();
            listeners.retain(|registration| registration.listener.strong_count() > 0);
            listeners
                .iter()
                .filter_map(|registration| registration.listener.upgrade())
                .collect()
        };

        for listener in snapshot {
            if listener.on_frame(frame.command, frame) == Disposition::Handled {
                return Disposition::Handled;
            }
        }
        trace!(command = frame.command, "no listener handled frame");
        Disposition::NotHandled
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
