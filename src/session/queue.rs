use std::cmp::Ordering;

use crate::buffered::{BufferedConversation, BufferedOutput};
use crate::protocol::types::SessionEvent;

/// Compare two chunk prefixes ignoring case.
fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Supplemental conversations waiting for their turn, ascending by chunk
/// prefix (prefixes are dates, so oldest first). No two entries share a
/// prefix.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    queue: Vec<BufferedConversation>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert in order. A conversation whose prefix is already queued is
    /// dropped and the queued one kept.
    pub fn insert(&mut self, conversation: BufferedConversation) {
        let position = self.queue.binary_search_by(|queued| {
            compare_ignore_case(queued.chunk_prefix(), conversation.chunk_prefix())
        });
        match position {
            Ok(_) => {
                tracing::error!(
                    chunk_prefix = conversation.chunk_prefix(),
                    "received duplicate interaction for an already queued chunk prefix"
                );
            }
            Err(index) => self.queue.insert(index, conversation),
        }
    }

    pub fn pop(&mut self) -> Option<BufferedConversation> {
        if self.queue.is_empty() {
            None
        } else {
            Some(self.queue.remove(0))
        }
    }

    /// Offer the event to queued conversations from the back of the queue to
    /// the front, stopping at the first one that takes it.
    pub fn on_new_event(&self, event: &SessionEvent) -> bool {
        self.queue
            .iter()
            .rev()
            .any(|conversation| conversation.on_new_event(event))
    }

    /// Interrupt and remove everything, returning it in queue order.
    pub fn clear(&mut self) -> Vec<BufferedConversation> {
        for conversation in &self.queue {
            conversation.interrupt();
        }
        std::mem::take(&mut self.queue)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::types::{ChunkRef, ConversationData, EventPayload};

    fn conversation(prefix: &str, id: &str) -> BufferedConversation {
        let event = SessionEvent::new(
            1,
            0,
            ChunkRef::new(prefix, 0),
            EventPayload::Conversation {
                data: ConversationData::new(id, "hello").initial(),
            },
        )
        .supplement();
        BufferedConversation::start(&event).unwrap()
    }

    fn prefixes(queue: &PriorityQueue) -> Vec<String> {
        queue
            .queue
            .iter()
            .map(|c| c.chunk_prefix().to_string())
            .collect()
    }

    #[test]
    fn keeps_ascending_order() {
        let mut queue = PriorityQueue::new();
        queue.insert(conversation("2024-01-03", "c"));
        queue.insert(conversation("2024-01-01", "a"));
        queue.insert(conversation("2024-01-02", "b"));
        assert_eq!(prefixes(&queue), vec!["2024-01-01", "2024-01-02", "2024-01-03"]);
        assert_eq!(queue.pop().unwrap().chunk_prefix(), "2024-01-01");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn ordering_ignores_case() {
        let mut queue = PriorityQueue::new();
        queue.insert(conversation("b", "1"));
        queue.insert(conversation("A", "2"));
        queue.insert(conversation("c", "3"));
        assert_eq!(prefixes(&queue), vec!["A", "b", "c"]);
    }

    #[test]
    fn duplicate_prefix_keeps_existing() {
        let mut queue = PriorityQueue::new();
        queue.insert(conversation("x", "first"));
        queue.insert(conversation("X", "second"));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().conversation_id(), "first");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn routes_events_to_matching_entry() {
        let mut queue = PriorityQueue::new();
        queue.insert(conversation("a", "1"));
        queue.insert(conversation("b", "2"));
        let side = SessionEvent::new(5, 0, ChunkRef::new("a", 0), EventPayload::StopListening);
        assert!(queue.on_new_event(&side));
        let stray = SessionEvent::new(6, 0, ChunkRef::new("z", 0), EventPayload::StopListening);
        assert!(!queue.on_new_event(&stray));
        assert_eq!(queue.pop().unwrap().events().len(), 1);
    }

    #[test]
    fn clear_interrupts_in_order() {
        let mut queue = PriorityQueue::new();
        queue.insert(conversation("b", "2"));
        queue.insert(conversation("a", "1"));
        let drained = queue.clear();
        assert!(queue.is_empty());
        assert_eq!(
            drained.iter().map(|c| c.chunk_prefix()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(drained.iter().all(BufferedConversation::was_interrupted));
    }
}
