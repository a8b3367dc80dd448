use std::collections::{HashMap, VecDeque};

use crate::protocol::types::SessionEvent;

/// Side-channel events that arrived before any buffered output claimed their
/// chunk prefix, grouped by prefix in arrival order.
///
/// Unbounded unless a prefix limit is set, in which case the prefix cached
/// earliest is evicted first.
#[derive(Debug, Default)]
pub struct OrphanCache {
    events: HashMap<String, Vec<SessionEvent>>,
    order: VecDeque<String>,
    prefix_limit: Option<usize>,
}

impl OrphanCache {
    pub fn new(prefix_limit: Option<usize>) -> Self {
        Self {
            prefix_limit,
            ..Self::default()
        }
    }

    pub fn insert(&mut self, event: SessionEvent) {
        let prefix = event.chunk_prefix().to_string();
        if let Some(events) = self.events.get_mut(&prefix) {
            events.push(event);
            return;
        }
        if let Some(limit) = self.prefix_limit {
            while self.events.len() >= limit.max(1) {
                let Some(evicted) = self.order.pop_front() else {
                    break;
                };
                if let Some(dropped) = self.events.remove(&evicted) {
                    tracing::warn!(
                        chunk_prefix = %evicted,
                        events = dropped.len(),
                        "evicted orphaned events that never found a conversation"
                    );
                }
            }
        }
        self.order.push_back(prefix.clone());
        self.events.insert(prefix, vec![event]);
    }

    /// Remove and return everything cached for the prefix.
    pub fn take(&mut self, chunk_prefix: &str) -> Vec<SessionEvent> {
        match self.events.remove(chunk_prefix) {
            Some(events) => {
                self.order.retain(|p| p != chunk_prefix);
                events
            }
            None => Vec::new(),
        }
    }

    /// Number of distinct prefixes held.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
