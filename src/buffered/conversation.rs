use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};

use super::BufferedOutput;
use crate::protocol::types::{ConversationData, SessionEvent};
use crate::signal::ReplayLog;

/// Reassembles the verbal chunks of one AI response into ordered text, plus
/// the side-channel events tied to that response.
///
/// Chunks may arrive in any order. Nothing is emitted until the chunk flagged
/// `initial` arrives, since that chunk fixes where the response starts. From
/// there every contiguous chunk is drained; a gap stalls reading until the
/// missing chunk shows up. Reading stops for good at the `final` chunk, so a
/// chunk at a higher offset than the final one is never read.
///
/// Side-channel events are cached by offset and become visible once the
/// conversation chunk at that offset has been drained.
///
/// Handles are cheap to clone and share state. Equality uses the identity
/// `{conversation_id}@{chunk_prefix}` only.
#[derive(Clone)]
pub struct BufferedConversation {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    conversation_id: String,
    chunk_prefix: String,
    buffers: Mutex<Buffers>,
    text: watch::Sender<String>,
    events: watch::Sender<Vec<SessionEvent>>,
    chunks: ReplayLog<ConversationData>,
}

#[derive(Default)]
struct Buffers {
    pending_chunks: BTreeMap<u32, ConversationData>,
    side_events: BTreeMap<u32, Vec<SessionEvent>>,
    /// Next offset to drain. `None` until the initial chunk is seen.
    offset_to_read: Option<u32>,
    text: String,
    is_finished: bool,
    is_token_maxed: bool,
    was_interrupted: bool,
}

impl Buffers {
    /// Side events at every offset before the read cursor, ascending.
    fn visible_events(&self) -> Vec<SessionEvent> {
        let Some(cursor) = self.offset_to_read else {
            return Vec::new();
        };
        self.side_events
            .range(..cursor)
            .flat_map(|(_, events)| events.iter().cloned())
            .collect()
    }
}

impl BufferedConversation {
    /// Start a conversation from its first accepted chunk.
    ///
    /// Returns `None` if the event is not a conversation chunk.
    pub fn start(event: &SessionEvent) -> Option<Self> {
        let data = event.as_conversation()?;
        let conversation = Self {
            inner: Arc::new(Inner {
                id: format!("{}@{}", data.conversation_id, event.chunk_prefix()),
                conversation_id: data.conversation_id.clone(),
                chunk_prefix: event.chunk_prefix().to_string(),
                buffers: Mutex::new(Buffers::default()),
                text: watch::Sender::new(String::new()),
                events: watch::Sender::new(Vec::new()),
                chunks: ReplayLog::new(),
            }),
        };
        conversation.on_new_event(event);
        Some(conversation)
    }

    /// Identity: `{conversation_id}@{chunk_prefix}`.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn conversation_id(&self) -> &str {
        &self.inner.conversation_id
    }

    pub fn is_finished(&self) -> bool {
        self.buffers().is_finished
    }

    pub fn is_token_maxed(&self) -> bool {
        self.buffers().is_token_maxed
    }

    pub fn was_interrupted(&self) -> bool {
        self.buffers().was_interrupted
    }

    /// Text reconstructed so far.
    pub fn text(&self) -> String {
        self.buffers().text.clone()
    }

    /// Chunks drained so far, in reading order.
    pub fn chunks(&self) -> Vec<ConversationData> {
        self.inner.chunks.snapshot()
    }

    pub fn subscribe_text(&self) -> watch::Receiver<String> {
        self.inner.text.subscribe()
    }

    /// Every drained chunk so far, then live chunks. The stream ends once the
    /// conversation finishes or is interrupted.
    pub fn subscribe_chunks(&self) -> mpsc::UnboundedReceiver<ConversationData> {
        self.inner.chunks.subscribe()
    }

    pub fn subscribe_events(&self) -> watch::Receiver<Vec<SessionEvent>> {
        self.inner.events.subscribe()
    }

    /// Stop reading. Later chunks are refused and side events are no longer
    /// merged in.
    pub fn interrupt(&self) {
        let mut buffers = self.buffers();
        buffers.was_interrupted = true;
        buffers.is_finished = true;
        self.inner.chunks.close();
    }

    fn buffers(&self) -> MutexGuard<'_, Buffers> {
        self.inner
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_next_chunk_if_available(&self, buffers: &mut Buffers) {
        let Some(mut offset) = buffers.offset_to_read else {
            return;
        };
        while let Some(data) = buffers.pending_chunks.remove(&offset) {
            if !self.inner.chunks.is_empty() {
                buffers.text.push(' ');
            }
            buffers.text.push_str(&data.content);
            offset = offset.saturating_add(1);
            buffers.offset_to_read = Some(offset);

            self.inner.text.send_replace(buffers.text.clone());
            self.inner.events.send_replace(buffers.visible_events());

            let is_final = data.is_final;
            let max_tokens = data.max_tokens;
            self.inner.chunks.push(data);

            if is_final {
                buffers.is_token_maxed = max_tokens;
                buffers.is_finished = true;
                self.inner.chunks.close();
                tracing::debug!(conversation = %self.inner.id, "conversation finished");
                return;
            }
        }
    }
}

impl BufferedOutput for BufferedConversation {
    fn chunk_prefix(&self) -> &str {
        &self.inner.chunk_prefix
    }

    fn on_new_event(&self, event: &SessionEvent) -> bool {
        if event.chunk_prefix() != self.inner.chunk_prefix {
            return false;
        }
        let mut buffers = self.buffers();

        if let Some(data) = event.as_conversation()
            && data.conversation_id == self.inner.conversation_id
            && !buffers.is_finished
        {
            if data.initial && buffers.offset_to_read.is_none() {
                buffers.offset_to_read = Some(event.chunk_offset());
            }
            buffers
                .pending_chunks
                .insert(event.chunk_offset(), data.clone());
            self.read_next_chunk_if_available(&mut buffers);
            return true;
        }

        if buffers.was_interrupted {
            return false;
        }

        let offset = event.chunk_offset();
        buffers
            .side_events
            .entry(offset)
            .or_default()
            .push(event.clone());
        if buffers.offset_to_read.is_some_and(|cursor| offset < cursor) {
            self.inner.events.send_replace(buffers.visible_events());
        }
        true
    }

    fn events(&self) -> Vec<SessionEvent> {
        self.buffers().visible_events()
    }
}

impl PartialEq for BufferedConversation {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for BufferedConversation {}

impl Hash for BufferedConversation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for BufferedConversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffers = self.buffers();
        f.debug_struct("BufferedConversation")
            .field("id", &self.inner.id)
            .field("text", &buffers.text)
            .field("is_finished", &buffers.is_finished)
            .field("was_interrupted", &buffers.was_interrupted)
            .finish_non_exhaustive()
    }
}
