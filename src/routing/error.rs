use thiserror::Error;

use super::subscription::SubscriptionId;
use crate::topic::TopicFilterError;

/// Errors returned by [`SubscriptionRegistry`](super::SubscriptionRegistry)
/// operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
	/// A filter failed validation; nothing was sent to the broker
	#[error("Invalid topic filter: {0}")]
	InvalidFilter(#[from] TopicFilterError),

	/// The connection manager was stopped
	#[error("Subscription registry is shut down")]
	ShutdownInProgress,

	/// The subscription was already removed
	#[error("Subscription {0} not found")]
	SubscriptionNotFound(SubscriptionId),
}

/// The broker denied a subscribe request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Subscription rejected: {reason}")]
pub struct SubscribeRejected {
	reason: String,
}

impl SubscribeRejected {
	/// Creates a rejection with `reason`.
	pub fn new(reason: impl Into<String>) -> Self {
		Self {
			reason: reason.into(),
		}
	}

	/// Why the broker refused.
	pub fn reason(&self) -> &str {
		&self.reason
	}
}
