//! Typed errors for billing operations.
//!
//! The original fragile pattern of string-matching on backend error messages
//! is replaced with tagged variants: an empty catalog and a transient network
//! failure are distinct cases, so callers dispatch without inspecting
//! human-readable text.

use thiserror::Error;

/// Error type shared by every billing backend behind the
/// [`SubscriptionService`](crate::SubscriptionService) contract.
///
/// User cancellation is deliberately not represented here: a cancelled
/// purchase is a normal outcome and surfaces as
/// [`PurchaseOutcome::Cancelled`](crate::PurchaseOutcome::Cancelled).
#[derive(Debug, Error)]
pub enum BillingError {
    /// No products are configured in the billing backend yet. This is an
    /// expected state during project setup, not a failure.
    #[error("no products configured in the billing backend")]
    CatalogEmpty,

    /// Transient transport failure while talking to the billing backend.
    #[error("{operation} failed: {reason}")]
    Network {
        operation: &'static str,
        reason: String,
    },

    /// The backend rejected a purchase attempt.
    #[error("payment failed: {reason}")]
    PaymentFailed { reason: String },

    /// The requested identity operation conflicts with the current billing
    /// identity (e.g. logging out an anonymous user). Adapters recover from
    /// this locally; it should never reach the store.
    #[error("identity conflict: {reason}")]
    IdentityConflict { reason: String },

    /// A service method was called before `configure`.
    #[error("billing service used before configure()")]
    NotConfigured,

    /// The service was constructed with an invalid or incomplete setup.
    #[error("billing misconfigured: {0}")]
    Misconfigured(String),

    /// Persistent key-value storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The operation has no meaning on the active platform.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl BillingError {
    /// Create a network error for the given operation.
    pub fn network(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Network {
            operation,
            reason: reason.into(),
        }
    }

    /// Create a payment failure.
    pub fn payment(reason: impl Into<String>) -> Self {
        Self::PaymentFailed {
            reason: reason.into(),
        }
    }

    /// Returns true if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Storage(_))
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
