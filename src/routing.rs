//! Subscription registry and message routing
//!
//! This module keeps track of subscriptions, sends their subscribe requests
//! when the connection allows it, and fans inbound messages out to every
//! subscription whose filters match.

/// Registry error types
pub mod error;
pub mod registry;
pub mod subscription;

// Re-export commonly used types for convenience
pub use error::{RegistryError, SubscribeRejected};
pub use registry::{RegistrySettings, SubscriptionRegistry};
pub use subscription::{
	SubscribeOptions, SubscribeResult, Subscription, SubscriptionId,
	SubscriptionStatus,
};
