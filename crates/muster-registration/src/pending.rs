//! The in-flight registration cycle and its single-use completion signal.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{RegistrationError, RegistrationResult};

/// Resolves once the server accepts or rejects the registration started by
/// [`RegistrationHandler::register`](crate::RegistrationHandler::register).
///
/// Yields [`RegistrationError::Superseded`] if a later `register()` call
/// replaced this request before the server answered.
#[derive(Debug)]
pub struct RegistrationFuture {
    rx: oneshot::Receiver<RegistrationResult<()>>,
}

impl Future for RegistrationFuture {
    type Output = RegistrationResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(RegistrationError::Superseded)))
    }
}

/// State of one registration cycle.
#[derive(Debug, Default)]
pub struct PendingRegistration {
    signal: Option<oneshot::Sender<RegistrationResult<()>>>,
    attempted_this_cycle: bool,
}

impl PendingRegistration {
    /// Start a new signal, dropping (and so superseding) any unresolved one.
    pub fn renew(&mut self) -> RegistrationFuture {
        let (tx, rx) = oneshot::channel();
        self.signal = Some(tx);
        RegistrationFuture { rx }
    }

    /// Resolve successfully. Returns false if there was nothing to settle.
    pub fn resolve(&mut self) -> bool {
        self.settle(Ok(()))
    }

    /// Reject with `error`. Returns false if there was nothing to settle.
    pub fn reject(&mut self, error: RegistrationError) -> bool {
        self.settle(Err(error))
    }

    fn settle(&mut self, outcome: RegistrationResult<()>) -> bool {
        match self.signal.take() {
            // The caller may have dropped the future; settling still counts.
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_outstanding(&self) -> bool {
        self.signal.is_some()
    }

    pub fn attempted_this_cycle(&self) -> bool {
        self.attempted_this_cycle
    }

    pub fn mark_attempted(&mut self, attempted: bool) {
        self.attempted_this_cycle = attempted;
    }

    pub fn end_cycle(&mut self) {
        self.attempted_this_cycle = false;
    }
}
