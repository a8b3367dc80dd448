//! Client-side reassembly and sequencing for a chunked, asynchronously
//! streamed conversational backend.
//!
//! Frames arrive out of order, in bursts, or ahead of the content they
//! annotate. [`ConversationStateProcessor`] routes them into buffered outputs
//! that rebuild one linear conversation stream, and tracks the session state
//! around it.

pub mod buffered;
pub mod config;
pub mod error;
pub mod protocol;
pub mod replay;
pub mod session;
pub mod signal;

pub use buffered::{BufferedConversation, BufferedNoResponse, BufferedOutput};
pub use config::ProcessorConfig;
pub use error::ConversationTimeout;
pub use protocol::types::{ChunkRef, ConversationData, EventPayload, SessionEvent};
pub use session::{
    ConversationState, ConversationStateProcessor, HistoryOutput, InteractionHistoryElement,
};
