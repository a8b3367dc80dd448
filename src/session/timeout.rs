use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Identifies one armed deadline. A ticket delivered by an expiry is only
/// meaningful while [`TimeoutMonitor::is_current`] still accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket(u64);

pub type TimeoutCallback = Arc<dyn Fn(TimerTicket) + Send + Sync>;

struct Armed {
    timeout: Duration,
    on_timeout: TimeoutCallback,
    task: JoinHandle<()>,
}

/// Restartable deadline for the active conversation.
///
/// The monitor never touches conversation state itself; on expiry it only
/// invokes the callback it was armed with. Must be used inside a tokio
/// runtime.
#[derive(Default)]
pub struct TimeoutMonitor {
    armed: Option<Armed>,
    epoch: u64,
}

impl TimeoutMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any running deadline and arm a fresh one.
    pub fn on_new_conversation_started(&mut self, timeout: Duration, on_timeout: TimeoutCallback) {
        self.cancel();
        self.arm(timeout, on_timeout);
    }

    /// Slide the running deadline forward by its full duration. No-op when
    /// nothing is armed.
    pub fn on_new_event_received(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
            self.arm(armed.timeout, armed.on_timeout);
        }
    }

    pub fn cancel(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
        }
        self.epoch += 1;
    }

    pub fn is_running(&self) -> bool {
        self.armed.is_some()
    }

    pub fn is_current(&self, ticket: TimerTicket) -> bool {
        self.is_running() && ticket.0 == self.epoch
    }

    fn arm(&mut self, timeout: Duration, on_timeout: TimeoutCallback) {
        self.epoch += 1;
        let ticket = TimerTicket(self.epoch);
        let callback = Arc::clone(&on_timeout);
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            callback(ticket);
        });
        self.armed = Some(Armed {
            timeout,
            on_timeout,
            task,
        });
    }
}

impl Drop for TimeoutMonitor {
    fn drop(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
        }
    }
}
