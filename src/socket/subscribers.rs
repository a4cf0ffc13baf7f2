//! Named-event subscriber registry.
//!
//! Handlers are keyed by [`EventName`] and run synchronously on the
//! dispatcher task, in registration order. Catch-all listeners receive a
//! clone of every event through an unbounded channel.
//!
//! Handlers are cloned out of the lock before they run, so a handler may
//! itself call `on`/`off` or any `Socket` operation.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::trace;

use crate::identifiers::SubscriptionId;
use crate::protocol::{EventName, SocketEvent};

// ============================================================================
// Types
// ============================================================================

/// Event handler callback type.
///
/// Called on the dispatcher task for each matching event. Handlers must not
/// block; spawn a task for anything slow.
pub type EventHandler = Arc<dyn Fn(&SocketEvent) + Send + Sync>;

/// Handlers registered for one event name.
type HandlerList = Vec<(SubscriptionId, EventHandler)>;

// ============================================================================
// Subscribers
// ============================================================================

/// Registry shared between `Socket` handles and the dispatcher.
#[derive(Default)]
pub(crate) struct Subscribers {
    handlers: Mutex<FxHashMap<EventName, HandlerList>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<SocketEvent>>>,
}

impl Subscribers {
    /// Registers `handler` for `name`.
    pub(crate) fn add(&self, name: EventName, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId::generate();
        trace!(%id, event = %name, "Handler registered");

        self.handlers.lock().entry(name).or_default().push((id, handler));
        id
    }

    /// Removes one handler. Returns `true` if it was registered.
    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let mut removed = false;

        handlers.retain(|_, list| {
            let before = list.len();
            list.retain(|(existing, _)| *existing != id);
            removed |= list.len() != before;
            !list.is_empty()
        });

        removed
    }

    /// Removes every handler for `name`. Returns how many were removed.
    pub(crate) fn remove_all(&self, name: &EventName) -> usize {
        self.handlers
            .lock()
            .remove(name)
            .map_or(0, |list| list.len())
    }

    /// Opens a catch-all listener.
    pub(crate) fn listen(&self) -> mpsc::UnboundedReceiver<SocketEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().push(tx);
        rx
    }

    /// Returns the number of handlers registered for `name`.
    #[cfg(test)]
    pub(crate) fn count(&self, name: &EventName) -> usize {
        self.handlers.lock().get(name).map_or(0, Vec::len)
    }

    /// Delivers `event` to matching handlers and all listeners.
    pub(crate) fn dispatch(&self, event: &SocketEvent) {
        let name = event.name();

        let matching: Vec<EventHandler> = self
            .handlers
            .lock()
            .get(&name)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        trace!(event = %name, handlers = matching.len(), "Dispatching event");

        for handler in matching {
            handler(event);
        }

        self.listeners
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::protocol::Envelope;

    fn counter() -> (Arc<AtomicUsize>, EventHandler) {
        let count = Arc::new(AtomicUsize::new(0));
        let clone = Arc::clone(&count);
        let handler: EventHandler = Arc::new(move |_: &SocketEvent| {
            clone.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    #[test]
    fn test_dispatch_by_name() {
        let subscribers = Subscribers::default();
        let (opens, on_open) = counter();
        let (statuses, on_status) = counter();

        subscribers.add(EventName::Open, on_open);
        subscribers.add(EventName::server("status"), on_status);

        subscribers.dispatch(&SocketEvent::Open);
        subscribers.dispatch(&SocketEvent::Server(Envelope::new("status", "running")));
        subscribers.dispatch(&SocketEvent::Server(Envelope::new("stats", "{}")));

        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(statuses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_handler() {
        let subscribers = Subscribers::default();
        let (count, handler) = counter();

        let id = subscribers.add(EventName::Close, handler);
        assert_eq!(subscribers.count(&EventName::Close), 1);

        assert!(subscribers.remove(id));
        assert!(!subscribers.remove(id));
        assert_eq!(subscribers.count(&EventName::Close), 0);

        subscribers.dispatch(&SocketEvent::Close);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_all() {
        let subscribers = Subscribers::default();
        let (_, first) = counter();
        let (_, second) = counter();

        subscribers.add("token expiring".into(), first);
        subscribers.add("token expiring".into(), second);

        assert_eq!(subscribers.remove_all(&"token expiring".into()), 2);
        assert_eq!(subscribers.remove_all(&"token expiring".into()), 0);
    }

    #[test]
    fn test_handler_may_register_during_dispatch() {
        let subscribers = Arc::new(Subscribers::default());
        let inner = Arc::clone(&subscribers);

        subscribers.add(
            EventName::Open,
            Arc::new(move |_: &SocketEvent| {
                let (_, noop) = counter();
                inner.add(EventName::Close, noop);
            }),
        );

        subscribers.dispatch(&SocketEvent::Open);
        assert_eq!(subscribers.count(&EventName::Close), 1);
    }

    #[tokio::test]
    async fn test_listener_receives_everything() {
        let subscribers = Subscribers::default();
        let mut rx = subscribers.listen();

        subscribers.dispatch(&SocketEvent::Open);
        subscribers.dispatch(&SocketEvent::Reconnect);

        assert!(matches!(rx.recv().await, Some(SocketEvent::Open)));
        assert!(matches!(rx.recv().await, Some(SocketEvent::Reconnect)));
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let subscribers = Subscribers::default();
        drop(subscribers.listen());

        subscribers.dispatch(&SocketEvent::Open);
        assert!(subscribers.listeners.lock().is_empty());
    }
}
