//! Lifecycle events consumed and registration events produced.

use std::fmt;

use tokio::sync::broadcast;
use tracing::debug;

/// Host lifecycle events that drive the registration handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Agent startup.
    Run,
    /// An exchange with the server is about to happen.
    PreExchange,
    /// An exchange with the server completed.
    ExchangeDone,
}

/// Events announced by the registration handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationEvent {
    RegistrationDone,
    RegistrationFailed,
    ResynchronizeClients,
}

impl RegistrationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegistrationDone => "registration-done",
            Self::RegistrationFailed => "registration-failed",
            Self::ResynchronizeClients => "resynchronize-clients",
        }
    }
}

impl fmt::Display for RegistrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Receiver side of the event bus.
pub trait EventSink: Send + Sync {
    fn fire(&self, event: RegistrationEvent);
}

/// Broadcast event bus; every subscriber sees every event fired after it subscribed.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RegistrationEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventSink for EventBus {
    fn fire(&self, event: RegistrationEvent) {
        debug!(event = %event, "firing event");
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}
