//! MQTT topic filter segment types

use std::convert::TryFrom;

use arcstr::Substr;
use thiserror::Error;

/// Error types for topic filter parsing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicFilterError {
	/// Empty filter is not valid
	#[error("Topic filter cannot be empty")]
	EmptyFilter,

	/// Multi-level wildcard (#) used not at the end of the filter
	#[error(
		"Invalid topic filter '{filter}': # wildcard can only be the last \
		 segment"
	)]
	HashPosition {
		/// The invalid filter
		filter: String,
	},

	/// Wildcard characters (+ or #) mixed into a literal level
	#[error(
		"Invalid wildcard usage in level '{level}': wildcards must occupy a \
		 whole level"
	)]
	WildcardUsage {
		/// The offending level
		level: String,
	},

	/// Filter contains a NUL character
	#[error("Topic filter contains a null character")]
	NullCharacter,

	/// Filter exceeds the protocol length limit
	#[error("Topic filter is too long: {len} > {max} bytes")]
	TooLong {
		/// Actual length in bytes
		len: usize,
		/// Maximum allowed length in bytes
		max: usize,
	},

	/// A filter set was built from nothing
	#[error("At least one topic filter is required")]
	NoFilters,
}

impl TopicFilterError {
	/// Creates a new HashPosition error
	pub fn hash_position(filter: impl Into<String>) -> Self {
		Self::HashPosition {
			filter: filter.into(),
		}
	}

	/// Creates a new WildcardUsage error
	pub fn wildcard_usage(level: impl Into<String>) -> Self {
		Self::WildcardUsage {
			level: level.into(),
		}
	}
}

/// One level of a topic filter: a literal string or a wildcard
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicFilterItem {
	/// Literal level, matched byte for byte
	Literal(Substr),
	/// `+`, matches exactly one level
	SingleLevel,
	/// `#`, matches the parent level and everything below it
	MultiLevel,
}

impl TopicFilterItem {
	/// Returns string representation of the filter item.
	pub fn as_str(&self) -> &str {
		match self {
			| TopicFilterItem::Literal(s) => s,
			| TopicFilterItem::SingleLevel => "+",
			| TopicFilterItem::MultiLevel => "#",
		}
	}

	/// Returns true if this item is a wildcard (+ or #).
	pub fn is_wildcard(&self) -> bool {
		!matches!(self, TopicFilterItem::Literal(_))
	}
}

impl std::fmt::Display for TopicFilterItem {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl TryFrom<Substr> for TopicFilterItem {
	type Error = TopicFilterError;

	fn try_from(level: Substr) -> Result<Self, Self::Error> {
		let item = match level.as_str() {
			| "+" => TopicFilterItem::SingleLevel,
			| "#" => TopicFilterItem::MultiLevel,
			| _ if level.contains(['+', '#']) => {
				return Err(TopicFilterError::wildcard_usage(level.as_str()));
			}
			| _ => TopicFilterItem::Literal(level),
		};
		Ok(item)
	}
}
