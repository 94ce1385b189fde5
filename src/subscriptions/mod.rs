//! Live query subscriptions.

mod manager;
mod types;

pub use manager::SubscriptionRegistry;
pub use types::{QueryCallback, SubscriptionId};
