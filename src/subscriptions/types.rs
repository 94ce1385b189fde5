//! Subscription identifiers and callback types.

use crate::query::QuerySnapshot;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback receiving a fresh [`QuerySnapshot`] every time the subscribed
/// collection could have changed.
pub type QueryCallback = Box<dyn FnMut(QuerySnapshot) + Send>;
