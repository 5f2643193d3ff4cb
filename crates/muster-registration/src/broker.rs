//! Narrow interfaces onto the broker infrastructure the engine drives.
//!
//! The message store, exchanger and endpoint configuration live outside this
//! crate; hosts implement these traits over their real services.

use std::collections::HashSet;

use crate::error::RegistrationResult;
use crate::messages::OutboundMessage;

/// Outbound message queue.
pub trait MessageStore: Send + Sync {
    /// Queue a message for the next exchange.
    fn add(&self, message: &OutboundMessage) -> RegistrationResult<()>;

    /// Drop every queued message.
    fn reset(&self) -> RegistrationResult<()>;

    /// Message types the server currently accepts.
    fn accepted_types(&self) -> HashSet<String>;

    /// Queued messages in send order, as wire records.
    fn pending_messages(&self) -> Vec<serde_json::Value>;

    fn accepts(&self, message_type: &str) -> bool {
        self.accepted_types().contains(message_type)
    }
}

/// Triggers network round-trips with the management server.
pub trait Exchanger: Send + Sync {
    /// Schedule an exchange now instead of waiting for the next interval.
    fn exchange(&self);
}

/// Live URL configuration of the message transport and ping service.
pub trait EndpointSink: Send + Sync {
    fn set_exchange_url(&self, url: &str);
    fn set_ping_url(&self, url: &str);
}
