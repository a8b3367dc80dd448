use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::BufferedOutput;
use crate::protocol::types::SessionEvent;

/// Collects the side-channel events of a response that has no verbal part.
///
/// Single-shot: it is complete as soon as it exists. Identity is the chunk
/// prefix.
#[derive(Clone)]
pub struct BufferedNoResponse {
    inner: Arc<Inner>,
}

struct Inner {
    chunk_prefix: String,
    events: Mutex<Vec<SessionEvent>>,
    events_tx: watch::Sender<Vec<SessionEvent>>,
}

impl BufferedNoResponse {
    /// Returns `None` if the event is not a no-response marker.
    pub fn start(event: &SessionEvent) -> Option<Self> {
        if !event.is_no_response() {
            return None;
        }
        Some(Self {
            inner: Arc::new(Inner {
                chunk_prefix: event.chunk_prefix().to_string(),
                events: Mutex::new(Vec::new()),
                events_tx: watch::Sender::new(Vec::new()),
            }),
        })
    }

    pub fn subscribe_events(&self) -> watch::Receiver<Vec<SessionEvent>> {
        self.inner.events_tx.subscribe()
    }

    fn lock_events(&self) -> MutexGuard<'_, Vec<SessionEvent>> {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl BufferedOutput for BufferedNoResponse {
    fn chunk_prefix(&self) -> &str {
        &self.inner.chunk_prefix
    }

    fn on_new_event(&self, event: &SessionEvent) -> bool {
        if event.chunk_prefix() != self.inner.chunk_prefix {
            return false;
        }
        if event.is_no_response() {
            return true;
        }
        let mut events = self.lock_events();
        events.push(event.clone());
        self.inner.events_tx.send_replace(events.clone());
        true
    }

    fn events(&self) -> Vec<SessionEvent> {
        self.lock_events().clone()
    }
}

impl PartialEq for BufferedNoResponse {
    fn eq(&self, other: &Self) -> bool {
        self.inner.chunk_prefix == other.inner.chunk_prefix
    }
}

impl Eq for BufferedNoResponse {}

impl Hash for BufferedNoResponse {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.chunk_prefix.hash(state);
    }
}

impl fmt::Debug for BufferedNoResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedNoResponse")
            .field("chunk_prefix", &self.inner.chunk_prefix)
            .field("events", &self.lock_events().len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::types::{ChunkRef, ConversationData, EventPayload};

    fn event(prefix: &str, offset: u32, payload: EventPayload) -> SessionEvent {
        SessionEvent::new(1, 0, ChunkRef::new(prefix, offset), payload)
    }

    #[test]
    fn start_requires_no_response() {
        assert!(BufferedNoResponse::start(&event("q", 0, EventPayload::StopListening)).is_none());
        let out = BufferedNoResponse::start(&event("q", 0, EventPayload::NoResponse)).unwrap();
        assert_eq!(out.chunk_prefix(), "q");
        assert!(out.events().is_empty());
    }

    #[test]
    fn repeated_marker_changes_nothing() {
        let out = BufferedNoResponse::start(&event("q", 0, EventPayload::NoResponse)).unwrap();
        assert!(out.on_new_event(&event("q", 3, EventPayload::NoResponse)));
        assert!(out.events().is_empty());
    }

    #[test]
    fn collects_matching_side_events_in_arrival_order() {
        let out = BufferedNoResponse::start(&event("q", 0, EventPayload::NoResponse)).unwrap();
        let rx = out.subscribe_events();
        assert!(out.on_new_event(&event("q", 2, EventPayload::StopListening)));
        assert!(out.on_new_event(&event(
            "q",
            1,
            EventPayload::Conversation {
                data: ConversationData::new("c", "x"),
            },
        )));
        assert!(!out.on_new_event(&event("other", 0, EventPayload::StopListening)));
        assert_eq!(out.events().len(), 2);
        assert_eq!(rx.borrow().len(), 2);
        assert_eq!(out.events()[0].payload, EventPayload::StopListening);
    }
}
