//! Platform adapters implementing the [`SubscriptionService`] contract.
//!
//! [`SubscriptionService`]: crate::SubscriptionService

mod mobile;
mod web;

pub use mobile::MobileAdapter;
pub use web::WebAdapter;
