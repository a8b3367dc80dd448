pub mod orphans;
pub mod processor;
pub mod queue;
pub mod state;
pub mod timeout;

pub use processor::{ConversationStateProcessor, TimeoutHandler};
pub use state::{ConversationState, HistoryOutput, InteractionHistoryElement};
