//! Recorded sessions replayed through a processor.
//!
//! A recording is line-oriented:
//!
//! ```text
//! # comment
//! > user input             on_new_input
//! < {"id":1,...}           update_conversation_buffers
//! ~ 1500                   wait 1500ms
//! !                        cancel
//! !!                       clear
//! ```
//!
//! Replaying produces a [`Transcript`]: every state entered, the timeouts
//! reported, and the final interaction history.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::buffered::BufferedOutput;
use crate::config::ProcessorConfig;
use crate::error::ConversationTimeout;
use crate::protocol::parse::parse_line;
use crate::protocol::types::SessionEvent;
use crate::session::{
    ConversationState, ConversationStateProcessor, HistoryOutput, InteractionHistoryElement,
};

/// One recorded operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Input(String),
    Frame(Box<SessionEvent>),
    Wait(Duration),
    Cancel,
    Clear,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recording {
    pub steps: Vec<Step>,
}

impl Recording {
    pub fn parse(text: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let step = if line == "!!" {
                Step::Clear
            } else if line == "!" {
                Step::Cancel
            } else if let Some(input) = line.strip_prefix("> ") {
                Step::Input(input.to_string())
            } else if let Some(json) = line.strip_prefix("< ") {
                let event = parse_line(json)
                    .with_context(|| format!("line {line_no}: malformed frame"))?
                    .with_context(|| format!("line {line_no}: empty frame"))?;
                Step::Frame(Box::new(event))
            } else if let Some(ms) = line.strip_prefix("~ ") {
                let ms: u64 = ms
                    .trim()
                    .parse()
                    .with_context(|| format!("line {line_no}: invalid wait `{ms}`"))?;
                Step::Wait(Duration::from_millis(ms))
            } else {
                bail!("line {line_no}: unrecognised step `{line}`");
            };
            steps.push(step);
        }
        Ok(Self { steps })
    }
}

/// Everything observable after a replay.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub states: Vec<ConversationState>,
    pub timeouts: Vec<ConversationTimeout>,
    pub history: Vec<InteractionHistoryElement>,
}

/// Drive a fresh processor through the recording and collect the result.
///
/// Must run inside a tokio runtime. Waits use tokio time, so a paused test
/// clock replays them instantly.
pub async fn replay(recording: &Recording, config: &ProcessorConfig) -> Transcript {
    let processor = ConversationStateProcessor::new(config);
    let mut transitions = processor.subscribe_transitions();
    let timeouts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&timeouts);
    processor.set_on_timeout(move |timeout| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(timeout);
    });

    for step in &recording.steps {
        match step {
            Step::Input(input) => processor.on_new_input(input.as_str()),
            Step::Frame(event) => processor.update_conversation_buffers(event.as_ref().clone()),
            Step::Cancel => processor.cancel(),
            Step::Clear => processor.clear(),
            Step::Wait(duration) => {
                processor.settled().await;
                tokio::time::sleep(*duration).await;
            }
        }
    }
    processor.settled().await;

    let mut states = Vec::new();
    while let Ok(state) = transitions.try_recv() {
        states.push(state);
    }
    let timeouts = timeouts
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    Transcript {
        states,
        timeouts,
        history: processor.history(),
    }
}

fn status(conversation: &crate::buffered::BufferedConversation) -> &'static str {
    if conversation.was_interrupted() {
        "interrupted"
    } else if conversation.is_token_maxed() {
        "token-maxed"
    } else if conversation.is_finished() {
        "finished"
    } else {
        "open"
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "states:")?;
        for state in &self.states {
            writeln!(f, "  {state}")?;
        }
        writeln!(f, "timeouts: {}", self.timeouts.len())?;
        writeln!(f, "history:")?;
        for element in &self.history {
            match element {
                InteractionHistoryElement::Input(input) => writeln!(f, "  input: {input}")?,
                InteractionHistoryElement::Output(HistoryOutput::Response(conversation)) => {
                    writeln!(
                        f,
                        "  response {} ({}, {} events): {}",
                        conversation.id(),
                        status(conversation),
                        conversation.events().len(),
                        conversation.text()
                    )?;
                }
                InteractionHistoryElement::Output(HistoryOutput::NoResponse(output)) => {
                    writeln!(
                        f,
                        "  no-response {}: {} events",
                        output.chunk_prefix(),
                        output.events().len()
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_step_kind() {
        let text = r#"
# a comment
> hello there
< {"id":1,"timestamp":0,"chunk_id":"a@0","type":"no_response"}
~ 250
!
!!
"#;
        let recording = Recording::parse(text).unwrap();
        assert_eq!(recording.steps.len(), 5);
        assert_eq!(recording.steps[0], Step::Input("hello there".into()));
        assert!(matches!(recording.steps[1], Step::Frame(ref e) if e.is_no_response()));
        assert_eq!(recording.steps[2], Step::Wait(Duration::from_millis(250)));
        assert_eq!(recording.steps[3], Step::Cancel);
        assert_eq!(recording.steps[4], Step::Clear);
    }

    #[test]
    fn reports_line_of_bad_frame() {
        let err = Recording::parse("> hi\n< {oops}\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn rejects_unknown_step() {
        let err = Recording::parse("? what").unwrap_err();
        assert!(err.to_string().contains("unrecognised step"));
    }
}
