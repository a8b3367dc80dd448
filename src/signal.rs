//! Multi-consumer channels for values published by the engine.
//!
//! Latest-value signals use `tokio::sync::watch` directly. The two types here
//! cover the cases `watch` cannot: every value delivered to every subscriber
//! (`Fanout`), and replay of everything published so far before switching to
//! live delivery (`ReplayLog`).

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Delivers every published value to every live subscriber, in order.
///
/// Subscribers only see values published after they subscribed. Dropped
/// receivers are pruned on the next publish.
pub struct Fanout<T> {
    subscribers: Mutex<Vec<UnboundedSender<T>>>,
}

impl<T: Clone> Fanout<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    pub fn publish(&self, value: &T) {
        lock(&self.subscribers).retain(|tx| tx.send(value.clone()).is_ok());
    }
}

impl<T: Clone> Default for Fanout<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only log whose subscribers first receive every entry logged so far,
/// then continue with live entries. Once closed, subscriptions end after the
/// replay.
pub struct ReplayLog<T> {
    inner: Mutex<ReplayInner<T>>,
}

struct ReplayInner<T> {
    entries: Vec<T>,
    subscribers: Vec<UnboundedSender<T>>,
    closed: bool,
}

impl<T: Clone> ReplayLog<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ReplayInner {
                entries: Vec::new(),
                subscribers: Vec::new(),
                closed: false,
            }),
        }
    }

    pub fn subscribe(&self) -> UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = lock(&self.inner);
        for entry in &inner.entries {
            // Receiver is still in scope, send cannot fail.
            let _ = tx.send(entry.clone());
        }
        if !inner.closed {
            inner.subscribers.push(tx);
        }
        rx
    }

    pub fn push(&self, value: T) {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return;
        }
        inner.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
        inner.entries.push(value);
    }

    /// End live delivery. Existing subscribers drain what they have and then
    /// observe the end of the stream.
    pub fn close(&self) {
        let mut inner = lock(&self.inner);
        inner.closed = true;
        inner.subscribers.clear();
    }

    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.inner).entries.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for ReplayLog<T> {
    fn default() -> Self {
        Self::new()
    }
}
