//! Out-of-band session invalidation.
//!
//! DESIGN
//! ======
//! Any API call can learn mid-session that the credential is no longer
//! accepted. Those calls hold a [`SignalSender`]; the session's signal loop
//! owns the matching [`SignalReceiver`]. Both ends show up in the types of
//! whoever uses them, so nothing listens on an implicit global bus.
//!
//! A signal raised by a rejected request carries the credential that request
//! used. The session ignores it once that credential is no longer the stored
//! one, so a late 401 cannot sign out a session established after it.

use tokio::sync::mpsc;

/// Why the server stopped accepting the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthSignal {
    /// A request was rejected for a bad or missing credential.
    Unauthorized,
    /// The credential's validity window has passed.
    TokenExpired,
}

impl AuthSignal {
    /// Value of the `reason` query hint on the login redirect.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::TokenExpired => "session_expired",
        }
    }
}

/// A signal plus the credential it was raised against, if known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub signal: AuthSignal,
    /// `None` applies to whatever session is current.
    pub credential: Option<String>,
}

impl Invalidation {
    #[must_use]
    pub fn for_credential(signal: AuthSignal, credential: impl Into<String>) -> Self {
        Self { signal, credential: Some(credential.into()) }
    }
}

impl From<AuthSignal> for Invalidation {
    fn from(signal: AuthSignal) -> Self {
        Self { signal, credential: None }
    }
}

/// Cloneable sending half handed to API clients.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<Invalidation>,
}

impl SignalSender {
    /// Emit a signal. Returns `false` if the receiving loop is gone.
    pub fn emit(&self, invalidation: impl Into<Invalidation>) -> bool {
        let invalidation = invalidation.into();
        let signal = invalidation.signal;
        let delivered = self.tx.send(invalidation).is_ok();
        if !delivered {
            tracing::debug!(?signal, "auth signal dropped, no listener");
        }
        delivered
    }
}

/// Receiving half consumed by [`crate::session::SessionManager::run_signal_loop`].
#[derive(Debug)]
pub struct SignalReceiver {
    rx: mpsc::UnboundedReceiver<Invalidation>,
}

impl SignalReceiver {
    /// Wait for the next signal; `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<Invalidation> {
        self.rx.recv().await
    }

    /// Take a signal that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Invalidation> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected sender/receiver pair.
#[must_use]
pub fn channel() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SignalSender { tx }, SignalReceiver { rx })
}

#[cfg(test)]
#[path = "signal_test.rs"]
mod tests;
