//! # Prokit Subscription Store
//!
//! Stateful orchestration over the `prokit-lib` billing contract:
//!
//! - [`lifecycle::detect`] — pure classification of entitlement transitions
//! - [`SubscriptionStore`] — holds the canonical state, dispatches to the
//!   active adapter, runs the detector, persists a safe subset and reacts
//!   to identity changes
//! - [`persist`] — the async key-value contract and the persisted subset
//! - [`identity`] — the identity/auth collaborator contract
//!
//! The store is an explicitly constructed, dependency-injected instance —
//! there is no global singleton. Clone it freely; clones share state.

pub mod identity;
pub mod lifecycle;
pub mod persist;
pub mod store;

pub use identity::{IdentityProvider, StaticIdentity};
pub use lifecycle::detect;
pub use persist::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, PersistedState};
pub use store::{
    LifecycleCallback, LifecycleToken, PurchaseStatus, StorePhase, SubscriptionStore,
};

pub type Result<T> = anyhow::Result<T>;
