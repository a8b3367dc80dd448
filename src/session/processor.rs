//! Conversation state processor.
//!
//! Accepts decoded frames and produces [`BufferedConversation`]s,
//! [`BufferedNoResponse`]s and the session state around them.
//!
//! A conversation is created either in response to user input or on the
//! backend's own initiative, flagged with `is_supplement`. A non-supplement
//! conversation is only accepted while input is being processed; otherwise it
//! is dropped. A supplemental conversation becomes `Responding` right away
//! when nothing else is active, or waits in a priority queue ordered by chunk
//! prefix. When the active conversation finishes the next queued one is
//! delivered directly, without passing through `Idle`.
//!
//! Side-channel frames (entities, actions) can arrive before the utterance
//! they refer to. Frames nobody claims yet are cached by chunk prefix and
//! replayed into the output that eventually claims the prefix.
//!
//! All mutation happens on one worker task that applies submitted operations
//! in order, so state transitions, history appends and queue changes are
//! linearizable. The public operations only enqueue and return.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::Span;

use super::orphans::OrphanCache;
use super::queue::PriorityQueue;
use super::state::{ConversationState, HistoryOutput, InteractionHistoryElement};
use super::timeout::{TimeoutCallback, TimeoutMonitor, TimerTicket};
use crate::buffered::{BufferedConversation, BufferedNoResponse, BufferedOutput};
use crate::config::ProcessorConfig;
use crate::error::ConversationTimeout;
use crate::protocol::types::SessionEvent;
use crate::signal::Fanout;

/// Called after a timed-out conversation has been interrupted.
pub type TimeoutHandler = Arc<dyn Fn(ConversationTimeout) + Send + Sync>;

enum Command {
    Input(String),
    Event(Box<SessionEvent>),
    Cancel,
    Clear,
    SetOnTimeout(Option<TimeoutHandler>),
    TimedOut(TimerTicket),
    Settled(oneshot::Sender<()>),
}

/// Handle to a running processor. Cheap to clone; the worker stops once every
/// handle is dropped.
///
/// `cancel` is best-effort: frames a subscriber already observed before the
/// cancel reached the worker stay observed.
#[derive(Clone)]
pub struct ConversationStateProcessor {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConversationState>,
    history: watch::Receiver<Vec<InteractionHistoryElement>>,
    transitions: Arc<Fanout<ConversationState>>,
}

impl ConversationStateProcessor {
    /// Spawn a processor on the current tokio runtime, logging under a
    /// `conversation_state_processor` span.
    pub fn new(config: &ProcessorConfig) -> Self {
        Self::spawn(config, tracing::info_span!("conversation_state_processor"))
    }

    /// Spawn a processor on the current tokio runtime. Every record the
    /// processor and its outputs log is emitted inside `span`.
    pub fn spawn(config: &ProcessorConfig, span: Span) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConversationState::Idle);
        let (history_tx, history) = watch::channel(Vec::new());
        let transitions = Arc::new(Fanout::new());

        let worker = Worker {
            timeout: config.response_timeout(),
            state: ConversationState::Idle,
            history: Vec::new(),
            queue: PriorityQueue::new(),
            orphans: OrphanCache::new(config.orphan_prefix_limit),
            monitor: TimeoutMonitor::new(),
            on_timeout: None,
            state_tx,
            history_tx,
            transitions: Arc::clone(&transitions),
            commands: commands.downgrade(),
            span,
        };
        tokio::spawn(worker.run(receiver));

        Self {
            commands,
            state,
            history,
            transitions,
        }
    }

    /// Interrupt whatever is active and start waiting for the response to
    /// `input`.
    pub fn on_new_input(&self, input: impl Into<String>) {
        self.submit(Command::Input(input.into()));
    }

    /// Route one frame. Frames are applied in call order.
    pub fn update_conversation_buffers(&self, event: SessionEvent) {
        self.submit(Command::Event(Box::new(event)));
    }

    /// Interrupt the active conversation and everything queued.
    pub fn cancel(&self) {
        self.submit(Command::Cancel);
    }

    /// Like [`cancel`](Self::cancel), and also empty the interaction history.
    pub fn clear(&self) {
        self.submit(Command::Clear);
    }

    pub fn set_on_timeout<F>(&self, on_timeout: F)
    where
        F: Fn(ConversationTimeout) + Send + Sync + 'static,
    {
        self.submit(Command::SetOnTimeout(Some(Arc::new(on_timeout))));
    }

    pub fn clear_on_timeout(&self) {
        self.submit(Command::SetOnTimeout(None));
    }

    /// Resolves once every operation submitted before this call has been
    /// applied.
    pub async fn settled(&self) {
        let (tx, rx) = oneshot::channel();
        self.submit(Command::Settled(tx));
        let _ = rx.await;
    }

    pub fn state(&self) -> ConversationState {
        self.state.borrow().clone()
    }

    /// Latest-value view of the state.
    pub fn subscribe_state(&self) -> watch::Receiver<ConversationState> {
        self.state.clone()
    }

    /// Every state entered from now on, in order, none skipped.
    pub fn subscribe_transitions(&self) -> mpsc::UnboundedReceiver<ConversationState> {
        self.transitions.subscribe()
    }

    pub fn history(&self) -> Vec<InteractionHistoryElement> {
        self.history.borrow().clone()
    }

    pub fn subscribe_history(&self) -> watch::Receiver<Vec<InteractionHistoryElement>> {
        self.history.clone()
    }

    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("conversation state processor has stopped, dropping operation");
        }
    }
}

struct Worker {
    timeout: Duration,
    state: ConversationState,
    history: Vec<InteractionHistoryElement>,
    queue: PriorityQueue,
    orphans: OrphanCache,
    monitor: TimeoutMonitor,
    on_timeout: Option<TimeoutHandler>,
    state_tx: watch::Sender<ConversationState>,
    history_tx: watch::Sender<Vec<InteractionHistoryElement>>,
    transitions: Arc<Fanout<ConversationState>>,
    commands: mpsc::WeakUnboundedSender<Command>,
    span: Span,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            let span = self.span.clone();
            span.in_scope(|| self.apply(command));
        }
        self.monitor.cancel();
        if !self.orphans.is_empty() {
            self.span.in_scope(|| {
                tracing::debug!(
                    chunk_prefixes = self.orphans.len(),
                    "processor stopped with unclaimed side events"
                );
            });
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Input(input) => self.on_new_input(input),
            Command::Event(event) => self.update_conversation_buffers(&event),
            Command::Cancel => self.interrupt_ongoing_conversation(),
            Command::Clear => {
                self.interrupt_ongoing_conversation();
                self.history.clear();
                self.history_tx.send_replace(Vec::new());
            }
            Command::SetOnTimeout(on_timeout) => self.on_timeout = on_timeout,
            Command::TimedOut(ticket) => self.on_timed_out(ticket),
            Command::Settled(done) => {
                let _ = done.send(());
            }
        }
    }

    fn on_new_input(&mut self, input: String) {
        self.interrupt_ongoing_conversation();
        self.publish(ConversationState::ProcessingInput {
            input: input.clone(),
        });
        self.push_history(InteractionHistoryElement::Input(input));
        self.start_conversation_timeout();
    }

    fn update_conversation_buffers(&mut self, event: &SessionEvent) {
        let consumed = match self.state.clone() {
            ConversationState::Idle => false,
            ConversationState::ProcessingInput { .. } => self.on_event_while_processing_input(event),
            ConversationState::Responding { conversation } => {
                let consumed = conversation.on_new_event(event);
                if consumed {
                    self.monitor.on_new_event_received();
                }
                self.finish_if_done(&conversation);
                consumed
            }
            ConversationState::NoResponse { output } => {
                if output.on_new_event(event) {
                    self.record_no_response(&output);
                    self.continue_if_needed();
                    return;
                }
                false
            }
        };
        if !consumed {
            self.route_unclaimed(event);
        }
    }

    fn on_event_while_processing_input(&mut self, event: &SessionEvent) -> bool {
        if !event.is_supplement
            && let Some(conversation) = self.start_conversation(event)
        {
            if self.is_recorded(&conversation) {
                tracing::debug!(
                    conversation = conversation.id(),
                    "chunk belongs to an already finished conversation"
                );
                return false;
            }
            self.monitor.on_new_event_received();
            self.publish(ConversationState::Responding {
                conversation: conversation.clone(),
            });
            self.finish_if_done(&conversation);
            return true;
        }
        if let Some(output) = self.start_no_response(event) {
            self.publish(ConversationState::NoResponse {
                output: output.clone(),
            });
            self.push_history(InteractionHistoryElement::Output(HistoryOutput::NoResponse(
                output,
            )));
            self.continue_if_needed();
            return true;
        }
        false
    }

    /// Routing for frames the active state did not take: past outputs first,
    /// then supplemental handling, then the orphan cache.
    fn route_unclaimed(&mut self, event: &SessionEvent) {
        let claimed_by_history = self
            .history
            .iter()
            .rev()
            .filter_map(InteractionHistoryElement::as_output)
            .any(|output| output.buffered_output().on_new_event(event));
        if claimed_by_history {
            return;
        }

        if event.is_supplement {
            if self.queue.on_new_event(event) {
                return;
            }
            match self.start_conversation(event) {
                Some(conversation) if self.state == ConversationState::Idle => {
                    self.start_conversation_timeout();
                    self.publish(ConversationState::Responding {
                        conversation: conversation.clone(),
                    });
                    self.finish_if_done(&conversation);
                }
                Some(conversation) => {
                    self.queue.insert(conversation);
                    tracing::debug!(queued = self.queue.len(), "queued supplemental conversation");
                }
                None => {
                    self.orphans.insert(event.clone());
                    tracing::debug!(
                        chunk = %event.chunk_ref,
                        chunk_prefixes = self.orphans.len(),
                        "caching orphaned supplemental event"
                    );
                }
            }
        } else if event.as_conversation().is_none() {
            self.orphans.insert(event.clone());
            tracing::debug!(
                event_id = event.id,
                chunk = %event.chunk_ref,
                chunk_prefixes = self.orphans.len(),
                "caching orphaned event"
            );
        } else {
            tracing::warn!(
                event_id = event.id,
                "conversation event ignored, it was neither for the current input nor a supplement"
            );
        }
    }

    fn start_conversation(&mut self, event: &SessionEvent) -> Option<BufferedConversation> {
        let conversation = BufferedConversation::start(event)?;
        for orphan in self.orphans.take(conversation.chunk_prefix()) {
            conversation.on_new_event(&orphan);
        }
        Some(conversation)
    }

    fn start_no_response(&mut self, event: &SessionEvent) -> Option<BufferedNoResponse> {
        let output = BufferedNoResponse::start(event)?;
        for orphan in self.orphans.take(output.chunk_prefix()) {
            output.on_new_event(&orphan);
        }
        Some(output)
    }

    fn is_recorded(&self, conversation: &BufferedConversation) -> bool {
        self.history
            .iter()
            .filter_map(InteractionHistoryElement::as_response)
            .any(|recorded| recorded == conversation)
    }

    fn finish_if_done(&mut self, conversation: &BufferedConversation) {
        if !conversation.is_finished() || self.is_recorded(conversation) {
            return;
        }
        self.push_history(InteractionHistoryElement::Output(HistoryOutput::Response(
            conversation.clone(),
        )));
        self.continue_if_needed();
    }

    fn continue_if_needed(&mut self) {
        self.monitor.cancel();
        match self.queue.pop() {
            None => self.publish(ConversationState::Idle),
            Some(next) => {
                self.start_conversation_timeout();
                self.publish(ConversationState::Responding {
                    conversation: next.clone(),
                });
                // May already be complete from frames received while queued.
                self.finish_if_done(&next);
            }
        }
    }

    fn interrupt_ongoing_conversation(&mut self) {
        // Cancelled from every state, not only Responding, so a deadline armed
        // by input cannot fire after the processor went idle.
        self.monitor.cancel();
        let ongoing = match &self.state {
            ConversationState::Responding { conversation } => {
                conversation.interrupt();
                Some(conversation.clone())
            }
            ConversationState::Idle
            | ConversationState::ProcessingInput { .. }
            | ConversationState::NoResponse { .. } => None,
        };
        if !self.queue.is_empty() {
            tracing::debug!(
                queued = self.queue.len(),
                "interrupting queued supplemental conversations"
            );
        }
        let queued = self.queue.clear();
        self.publish(ConversationState::Idle);
        for conversation in ongoing.into_iter().chain(queued) {
            self.push_history(InteractionHistoryElement::Output(HistoryOutput::Response(
                conversation,
            )));
        }
    }

    fn on_timed_out(&mut self, ticket: TimerTicket) {
        if !self.monitor.is_current(ticket) {
            tracing::debug!("ignoring expiry of a superseded deadline");
            return;
        }
        tracing::warn!(
            timeout = ?self.timeout,
            state = %self.state,
            "conversation timed out"
        );
        self.interrupt_ongoing_conversation();
        if let Some(on_timeout) = &self.on_timeout {
            on_timeout(ConversationTimeout {
                timeout: self.timeout,
            });
        }
    }

    fn start_conversation_timeout(&mut self) {
        let commands = self.commands.clone();
        let on_timeout: TimeoutCallback = Arc::new(move |ticket| {
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::TimedOut(ticket));
            }
        });
        self.monitor
            .on_new_conversation_started(self.timeout, on_timeout);
    }

    fn publish(&mut self, state: ConversationState) {
        tracing::debug!(%state, "conversation state changed");
        self.state_tx.send_replace(state.clone());
        self.transitions.publish(&state);
        self.state = state;
    }

    fn push_history(&mut self, element: InteractionHistoryElement) {
        self.history.push(element);
        self.history_tx.send_replace(self.history.clone());
    }

    /// Re-record a no-response output in place rather than appending it twice.
    fn record_no_response(&mut self, output: &BufferedNoResponse) {
        let element =
            InteractionHistoryElement::Output(HistoryOutput::NoResponse(output.clone()));
        match self.history.iter().rposition(|recorded| *recorded == element) {
            Some(index) => {
                self.history[index] = element;
                self.history_tx.send_replace(self.history.clone());
            }
            None => self.push_history(element),
        }
    }
}
