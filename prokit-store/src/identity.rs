//! Identity/auth collaborator contract.
//!
//! The store never polls for the signed-in user: it subscribes to a watch
//! channel and re-initializes whenever the emitted identity changes.

use tokio::sync::watch;

/// Exposes the current application user and a subscribe-to-changes channel.
pub trait IdentityProvider: Send + Sync {
    /// The current application user id, `None` when anonymous.
    fn current_user_id(&self) -> Option<String>;

    /// Receiver that observes every identity change (sign-in, sign-out,
    /// account switch).
    fn subscribe(&self) -> watch::Receiver<Option<String>>;
}

/// Watch-backed identity provider driven by the embedding application
/// (or by tests).
pub struct StaticIdentity {
    tx: watch::Sender<Option<String>>,
}

impl StaticIdentity {
    pub fn new(initial: Option<String>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    /// Publish an identity change to every subscriber.
    pub fn set_user(&self, user_id: Option<String>) {
        self.tx.send_replace(user_id);
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}
