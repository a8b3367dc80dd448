//! Buffered outputs: per-response accumulators that absorb frames belonging
//! to them and expose the reconstructed, ordered result.

pub mod conversation;
pub mod no_response;

pub use conversation::BufferedConversation;
pub use no_response::BufferedNoResponse;

use crate::protocol::types::SessionEvent;

/// Something that can claim frames for one chunk prefix.
pub trait BufferedOutput {
    fn chunk_prefix(&self) -> &str;

    /// Offer an event. Returns `true` if the event was absorbed; on `false`
    /// nothing changed and routing is left to the caller.
    fn on_new_event(&self, event: &SessionEvent) -> bool;

    /// Side-channel events currently visible, in order.
    fn events(&self) -> Vec<SessionEvent>;
}
