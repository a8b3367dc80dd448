use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChunkRefError;

/// Position of an event inside one logical AI response, in the `{prefix}@{offset}` form.
///
/// The prefix identifies the response; the offset is the logical order of the
/// event within that response's stream. Offsets are not guaranteed to start at 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkRef {
    prefix: String,
    offset: u32,
}

impl ChunkRef {
    pub fn new(prefix: impl Into<String>, offset: u32) -> Self {
        Self {
            prefix: prefix.into(),
            offset,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.prefix, self.offset)
    }
}

impl TryFrom<String> for ChunkRef {
    type Error = ChunkRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChunkRef> for String {
    fn from(value: ChunkRef) -> Self {
        value.to_string()
    }
}

/// A single frame body delivered by the transport, already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Increasing event id, usable as a resume point by the transport.
    pub id: i64,
    /// Creation time as a unix timestamp.
    pub timestamp: i64,
    #[serde(rename = "chunk_id")]
    pub chunk_ref: ChunkRef,
    /// Set for events the backend sent on its own initiative rather than in
    /// direct response to the latest user input.
    #[serde(default)]
    pub is_supplement: bool,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl SessionEvent {
    pub fn new(id: i64, timestamp: i64, chunk_ref: ChunkRef, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            chunk_ref,
            is_supplement: false,
            payload,
        }
    }

    #[must_use]
    pub fn supplement(mut self) -> Self {
        self.is_supplement = true;
        self
    }

    pub fn chunk_prefix(&self) -> &str {
        self.chunk_ref.prefix()
    }

    pub fn chunk_offset(&self) -> u32 {
        self.chunk_ref.offset()
    }

    pub fn as_conversation(&self) -> Option<&ConversationData> {
        match &self.payload {
            EventPayload::Conversation { data } => Some(data),
            _ => None,
        }
    }

    pub fn is_no_response(&self) -> bool {
        matches!(self.payload, EventPayload::NoResponse)
    }
}

/// Payload variants. Everything except `Conversation` and `NoResponse` is a
/// side-channel event whose contents the engine does not inspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// One chunk (typically a sentence) of a verbal response.
    Conversation { data: ConversationData },
    /// The backend has no verbal response for the query.
    NoResponse,
    /// Entities such as POIs or song names extracted from the conversation.
    Entity {
        #[serde(default)]
        data: Vec<Value>,
    },
    /// An action the client is asked to perform.
    Action {
        name: String,
        #[serde(default)]
        data: Value,
    },
    /// Close the microphone and stop capturing input.
    StopListening,
    #[serde(other)]
    Unknown,
}

/// Contents of a conversation chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationData {
    pub conversation_id: String,
    pub content: String,
    /// First chunk of the response stream.
    #[serde(default)]
    pub initial: bool,
    /// Chunk confirms a user action.
    #[serde(default)]
    pub confirmation: bool,
    /// Last chunk of the response stream.
    #[serde(default, rename = "final")]
    pub is_final: bool,
    /// The response hit the profile's token limit.
    #[serde(default)]
    pub max_tokens: bool,
}

impl ConversationData {
    pub fn new(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            content: content.into(),
            initial: false,
            confirmation: false,
            is_final: false,
            max_tokens: false,
        }
    }

    #[must_use]
    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    #[must_use]
    pub fn last(mut self) -> Self {
        self.is_final = true;
        self
    }

    #[must_use]
    pub fn token_maxed(mut self) -> Self {
        self.max_tokens = true;
        self
    }
}
