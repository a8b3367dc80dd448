use std::fmt;

use crate::buffered::{BufferedConversation, BufferedNoResponse, BufferedOutput};

/// Current state of the conversation session. Exactly one value at a time.
///
/// At most one conversation is ever active; supplemental conversations that
/// arrive meanwhile wait in the priority queue instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConversationState {
    #[default]
    Idle,
    /// User input was sent and the response has not started yet.
    ProcessingInput { input: String },
    Responding { conversation: BufferedConversation },
    NoResponse { output: BufferedNoResponse },
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationState::Idle => f.write_str("idle"),
            ConversationState::ProcessingInput { input } => write!(f, "processing {input:?}"),
            ConversationState::Responding { conversation } => {
                write!(f, "responding {}", conversation.id())
            }
            ConversationState::NoResponse { output } => {
                write!(f, "no-response {}", output.chunk_prefix())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutput {
    Response(BufferedConversation),
    NoResponse(BufferedNoResponse),
}

impl HistoryOutput {
    pub fn buffered_output(&self) -> &dyn BufferedOutput {
        match self {
            HistoryOutput::Response(conversation) => conversation,
            HistoryOutput::NoResponse(output) => output,
        }
    }
}

/// One entry of the append-only interaction log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionHistoryElement {
    Input(String),
    Output(HistoryOutput),
}

impl InteractionHistoryElement {
    pub fn as_output(&self) -> Option<&HistoryOutput> {
        match self {
            InteractionHistoryElement::Output(output) => Some(output),
            InteractionHistoryElement::Input(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&BufferedConversation> {
        match self.as_output()? {
            HistoryOutput::Response(conversation) => Some(conversation),
            HistoryOutput::NoResponse(_) => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::types::{ChunkRef, ConversationData, EventPayload, SessionEvent};

    #[test]
    fn display_names_each_state() {
        let event = SessionEvent::new(
            1,
            0,
            ChunkRef::new("p", 0),
            EventPayload::Conversation {
                data: ConversationData::new("c", "hi").initial(),
            },
        );
        let conversation = BufferedConversation::start(&event).unwrap();
        assert_eq!(ConversationState::Idle.to_string(), "idle");
        assert_eq!(
            ConversationState::ProcessingInput {
                input: "go home".into()
            }
            .to_string(),
            "processing \"go home\""
        );
        assert_eq!(
            ConversationState::Responding {
                conversation: conversation.clone()
            }
            .to_string(),
            "responding c@p"
        );

        let element = InteractionHistoryElement::Output(HistoryOutput::Response(conversation));
        assert_eq!(element.as_response().unwrap().id(), "c@p");
        assert!(InteractionHistoryElement::Input("x".into()).as_output().is_none());
    }
}
