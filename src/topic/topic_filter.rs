//! Parsed topic filters and the filter/topic matching rules

use std::fmt;
use std::str::FromStr;

use arcstr::ArcStr;
use smallvec::SmallVec;

use super::error::limits::MAX_TOPIC_LENGTH;
use super::topic_filter_item::{TopicFilterError, TopicFilterItem};
use super::topic_path::TopicPath;

/// Level separator of the topic namespace.
pub const LEVEL_SEPARATOR: char = '/';

/// Matches a concrete `topic` against a subscription `filter`.
///
/// Total and allocation free. A filter that would be rejected by
/// [`TopicFilter::new`] never matches anything.
///
/// ```rust
/// use mqtt_session::topic::matches;
///
/// assert!(matches("a/+/c", "a/b/c"));
/// assert!(matches("a/#", "a"));
/// assert!(!matches("+/b", "$SYS/b"));
/// ```
pub fn matches(filter: &str, topic: &str) -> bool {
	if filter.is_empty()
		|| topic.is_empty()
		|| filter.len() > MAX_TOPIC_LENGTH
		|| filter.contains('\0')
	{
		return false;
	}
	let reserved = topic.starts_with('$');
	let mut filter_levels = filter.split(LEVEL_SEPARATOR).peekable();
	let mut topic_levels = topic.split(LEVEL_SEPARATOR);
	let mut first = true;

	loop {
		match (filter_levels.next(), topic_levels.next()) {
			| (Some("#"), _) => {
				return filter_levels.peek().is_none() && !(first && reserved);
			}
			| (Some("+"), Some(_)) => {
				if first && reserved {
					return false;
				}
			}
			| (Some(expected), Some(level)) => {
				if expected != level || expected.contains(['+', '#']) {
					return false;
				}
			}
			| (None, None) => return true,
			| _ => return false,
		}
		first = false;
	}
}

/// A validated subscription filter.
///
/// Immutable once built. Equality and hashing use the filter string.
#[derive(Debug, Clone)]
pub struct TopicFilter {
	filter: ArcStr,
	segments: SmallVec<[TopicFilterItem; 8]>,
}

impl TopicFilter {
	/// Parses and validates a filter.
	pub fn new(filter: impl Into<ArcStr>) -> Result<Self, TopicFilterError> {
		let filter = filter.into();
		if filter.is_empty() {
			return Err(TopicFilterError::EmptyFilter);
		}
		if filter.len() > MAX_TOPIC_LENGTH {
			return Err(TopicFilterError::TooLong {
				len: filter.len(),
				max: MAX_TOPIC_LENGTH,
			});
		}
		if filter.contains('\0') {
			return Err(TopicFilterError::NullCharacter);
		}

		let segments = filter
			.split(LEVEL_SEPARATOR)
			.map(|level| TopicFilterItem::try_from(filter.substr_from(level)))
			.collect::<Result<SmallVec<[TopicFilterItem; 8]>, _>>()?;

		if let Some(hash_pos) = segments
			.iter()
			.position(|s| matches!(s, TopicFilterItem::MultiLevel))
		{
			if hash_pos != segments.len() - 1 {
				return Err(TopicFilterError::hash_position(filter.as_str()));
			}
		}

		Ok(Self { filter, segments })
	}

	/// The filter as sent to the broker.
	pub fn as_str(&self) -> &str {
		&self.filter
	}

	/// Shared handle to the filter string.
	pub fn as_arcstr(&self) -> ArcStr {
		self.filter.clone()
	}

	/// Parsed levels in order.
	pub fn segments(&self) -> &[TopicFilterItem] {
		&self.segments
	}

	/// True if any level is `+` or `#`.
	pub fn has_wildcards(&self) -> bool {
		self.segments.iter().any(TopicFilterItem::is_wildcard)
	}

	/// Matches an already split topic.
	pub fn matches(&self, topic: &TopicPath) -> bool {
		let levels = topic.segments();
		let reserved = topic.is_reserved();

		for (position, item) in self.segments.iter().enumerate() {
			let guarded = position == 0 && reserved;
			match item {
				| TopicFilterItem::MultiLevel => return !guarded,
				| TopicFilterItem::SingleLevel => {
					if guarded || position >= levels.len() {
						return false;
					}
				}
				| TopicFilterItem::Literal(expected) => {
					match levels.get(position) {
						| Some(level) if level.as_str() == expected.as_str() => {}
						| _ => return false,
					}
				}
			}
		}
		levels.len() == self.segments.len()
	}

	/// Convenience wrapper around [`TopicFilter::matches`] for raw topics.
	pub fn matches_topic(&self, topic: &str) -> bool {
		!topic.is_empty() && self.matches(&TopicPath::new(topic))
	}
}

impl PartialEq for TopicFilter {
	fn eq(&self, other: &Self) -> bool {
		self.filter == other.filter
	}
}

impl Eq for TopicFilter {}

impl std::hash::Hash for TopicFilter {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.filter.hash(state)
	}
}

impl fmt::Display for TopicFilter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.filter)
	}
}

impl AsRef<str> for TopicFilter {
	fn as_ref(&self) -> &str {
		&self.filter
	}
}

impl FromStr for TopicFilter {
	type Err = TopicFilterError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

impl TryFrom<&str> for TopicFilter {
	type Error = TopicFilterError;

	fn try_from(value: &str) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

impl TryFrom<String> for TopicFilter {
	type Error = TopicFilterError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

/// Filters registered together under one subscription.
///
/// Never empty, duplicates removed, registration order kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilterSet {
	filters: SmallVec<[TopicFilter; 1]>,
}

impl TopicFilterSet {
	/// Builds a set from already parsed filters.
	pub fn new(
		filters: impl IntoIterator<Item = TopicFilter>,
	) -> Result<Self, TopicFilterError> {
		let mut unique: SmallVec<[TopicFilter; 1]> = SmallVec::new();
		for filter in filters {
			if !unique.contains(&filter) {
				unique.push(filter);
			}
		}
		if unique.is_empty() {
			return Err(TopicFilterError::NoFilters);
		}
		Ok(Self { filters: unique })
	}

	/// Parses every string and builds a set; the first invalid filter wins.
	pub fn parse<I, S>(filters: I) -> Result<Self, TopicFilterError>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let parsed = filters
			.into_iter()
			.map(|f| TopicFilter::new(f.as_ref()))
			.collect::<Result<Vec<_>, _>>()?;
		Self::new(parsed)
	}

	/// Filters in registration order.
	pub fn iter(&self) -> std::slice::Iter<'_, TopicFilter> {
		self.filters.iter()
	}

	/// Filters as a slice.
	pub fn as_slice(&self) -> &[TopicFilter] {
		&self.filters
	}

	/// Number of distinct filters.
	pub fn len(&self) -> usize {
		self.filters.len()
	}

	/// Always false; kept for API symmetry with `len`.
	pub fn is_empty(&self) -> bool {
		self.filters.is_empty()
	}

	/// True if any filter in the set matches.
	pub fn matches(&self, topic: &TopicPath) -> bool {
		self.filters.iter().any(|f| f.matches(topic))
	}
}

impl<'a> IntoIterator for &'a TopicFilterSet {
	type Item = &'a TopicFilter;
	type IntoIter = std::slice::Iter<'a, TopicFilter>;

	fn into_iter(self) -> Self::IntoIter {
		self.filters.iter()
	}
}

/// Anything a subscription can be registered with: one filter or several.
pub trait IntoTopicFilters {
	/// Parses and validates into a filter set.
	fn into_topic_filters(self) -> Result<TopicFilterSet, TopicFilterError>;
}

impl IntoTopicFilters for TopicFilterSet {
	fn into_topic_filters(self) -> Result<TopicFilterSet, TopicFilterError> {
		Ok(self)
	}
}

impl IntoTopicFilters for TopicFilter {
	fn into_topic_filters(self) -> Result<TopicFilterSet, TopicFilterError> {
		TopicFilterSet::new([self])
	}
}

impl IntoTopicFilters for &str {
	fn into_topic_filters(self) -> Result<TopicFilterSet, TopicFilterError> {
		TopicFilterSet::new([TopicFilter::new(self)?])
	}
}

impl IntoTopicFilters for String {
	fn into_topic_filters(self) -> Result<TopicFilterSet, TopicFilterError> {
		TopicFilterSet::new([TopicFilter::new(self)?])
	}
}

impl IntoTopicFilters for ArcStr {
	fn into_topic_filters(self) -> Result<TopicFilterSet, TopicFilterError> {
		TopicFilterSet::new([TopicFilter::new(self)?])
	}
}

impl<T: AsRef<str>> IntoTopicFilters for Vec<T> {
	fn into_topic_filters(self) -> Result<TopicFilterSet, TopicFilterError> {
		TopicFilterSet::parse(self)
	}
}

impl<T: AsRef<str>> IntoTopicFilters for &[T] {
	fn into_topic_filters(self) -> Result<TopicFilterSet, TopicFilterError> {
		TopicFilterSet::parse(self)
	}
}

impl<T: AsRef<str>, const N: usize> IntoTopicFilters for [T; N] {
	fn into_topic_filters(self) -> Result<TopicFilterSet, TopicFilterError> {
		TopicFilterSet::parse(self)
	}
}
