//! Error types and utilities for the topic module
//!
//! Holds the composite error type and the shared limits. Individual error
//! types stay next to the code that raises them.

use thiserror::Error;

use super::topic_filter_item::TopicFilterError;
use super::topic_matcher::TopicMatcherError;

/// Comprehensive error type for all topic-related operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
	/// Filter parsing or validation error
	#[error("Topic filter error: {0}")]
	Filter(#[from] TopicFilterError),

	/// Index maintenance error
	#[error("Topic matcher error: {0}")]
	Matcher(#[from] TopicMatcherError),

	/// A concrete topic that can not be routed
	#[error("Topic '{topic}' is invalid: {reason}")]
	InvalidTopic {
		/// The rejected topic
		topic: String,
		/// Why it was rejected
		reason: String,
	},
}

impl TopicError {
	/// Creates a new InvalidTopic error
	pub fn invalid_topic(
		topic: impl Into<String>,
		reason: impl Into<String>,
	) -> Self {
		Self::InvalidTopic {
			topic: topic.into(),
			reason: reason.into(),
		}
	}
}

/// Convenient Result type for topic operations
pub type TopicResult<T> = Result<T, TopicError>;

/// Topic processing limits
pub mod limits {
	/// Maximum length in bytes of a topic or topic filter (MQTT string limit)
	pub const MAX_TOPIC_LENGTH: usize = 65535;
}

/// Validation utilities for topic operations
pub mod validation {
	use super::TopicError;
	use super::limits::MAX_TOPIC_LENGTH;

	/// Checks that an inbound publish topic is routable.
	///
	/// Publish topics must be non-empty, within the length limit, and free
	/// of wildcards and NUL characters.
	pub fn validate_topic(topic: &str) -> Result<(), TopicError> {
		if topic.is_empty() || topic.len() > MAX_TOPIC_LENGTH {
			return Err(TopicError::invalid_topic(
				topic,
				"Topic is empty or too long",
			));
		}
		if topic.chars().any(|c| matches!(c, '\0' | '#' | '+')) {
			return Err(TopicError::invalid_topic(
				topic,
				"Topic contains illegal characters ('#', '+', or null byte)",
			));
		}
		Ok(())
	}
}
