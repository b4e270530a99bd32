//! Wildcard-aware index from topic filters to stored values.

use std::collections::{BTreeSet, HashMap, HashSet};

use arcstr::Substr;
use thiserror::Error;

use super::topic_filter::TopicFilter;
use super::topic_filter_item::TopicFilterItem;
use super::topic_path::TopicPath;

/// Errors that can occur while maintaining the index
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicMatcherError {
	/// No node exists for the given filter
	#[error("No index entry for level '{level}' at position {position}")]
	UnknownFilter {
		/// The level that could not be followed
		level: String,
		/// Position of the level inside the filter
		position: usize,
	},
}

impl TopicMatcherError {
	/// Creates a new UnknownFilter error
	pub fn unknown_filter(level: impl Into<String>, position: usize) -> Self {
		Self::UnknownFilter {
			level: level.into(),
			position,
		}
	}
}

/// Containers that can tell whether they still hold anything.
///
/// The index prunes nodes whose data became empty.
pub trait IsEmpty {
	/// True if nothing is stored.
	fn is_empty(&self) -> bool;
}

impl<T> IsEmpty for HashSet<T> {
	fn is_empty(&self) -> bool {
		HashSet::is_empty(self)
	}
}

impl<T> IsEmpty for BTreeSet<T> {
	fn is_empty(&self) -> bool {
		BTreeSet::is_empty(self)
	}
}

impl<T> IsEmpty for Vec<T> {
	fn is_empty(&self) -> bool {
		Vec::is_empty(self)
	}
}

/// Node of the filter tree. The root represents the empty prefix.
#[derive(Debug)]
pub struct TopicMatcherNode<T> {
	/// Data for filters ending exactly at this node
	exact_match_data: Option<T>,

	/// Children for literal next levels
	exact_children: HashMap<Substr, TopicMatcherNode<T>>,

	/// Child for a `+` next level
	single_level_wildcard_node: Option<Box<TopicMatcherNode<T>>>,

	/// Data for filters continuing with `#` after this node
	multi_level_wildcard_data: Option<T>,
}

impl<T: Default + IsEmpty> Default for TopicMatcherNode<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Default + IsEmpty> TopicMatcherNode<T> {
	/// Creates a new empty node
	pub fn new() -> Self {
		Self {
			exact_match_data: None,
			exact_children: HashMap::new(),
			single_level_wildcard_node: None,
			multi_level_wildcard_data: None,
		}
	}

	/// True if neither this node nor any descendant holds data.
	pub fn is_empty(&self) -> bool {
		self.exact_match_data.as_ref().is_none_or(T::is_empty)
			&& self.exact_children.is_empty()
			&& self.single_level_wildcard_node.is_none()
			&& self
				.multi_level_wildcard_data
				.as_ref()
				.is_none_or(T::is_empty)
	}

	/// Finds or creates the data slot for `filter`.
	pub fn entry(&mut self, filter: &TopicFilter) -> &mut T {
		let mut current_node = self;

		for segment in filter.segments() {
			match segment {
				| TopicFilterItem::Literal(s) => {
					current_node = current_node
						.exact_children
						.entry(s.clone())
						.or_default()
				}
				| TopicFilterItem::SingleLevel => {
					current_node = current_node
						.single_level_wildcard_node
						.get_or_insert_with(|| Box::new(TopicMatcherNode::new()))
				}
				| TopicFilterItem::MultiLevel => {
					// `#` is always last
					return current_node
						.multi_level_wildcard_data
						.get_or_insert_with(T::default);
				}
			}
		}
		current_node.exact_match_data.get_or_insert_with(T::default)
	}

	/// Applies `f` to the slot for `filter` and prunes emptied nodes.
	///
	/// Returns true if this node became empty.
	pub fn update<F>(
		&mut self,
		filter: &TopicFilter,
		f: F,
	) -> Result<bool, TopicMatcherError>
	where
		F: FnMut(&mut T),
	{
		self.update_node(filter.segments(), 0, f)
	}

	fn update_node<F>(
		&mut self,
		segments: &[TopicFilterItem],
		position: usize,
		mut f: F,
	) -> Result<bool, TopicMatcherError>
	where
		F: FnMut(&mut T),
	{
		let Some((current_segment, rest_segments)) = segments.split_first()
		else {
			let data = self.exact_match_data.as_mut().ok_or_else(|| {
				TopicMatcherError::unknown_filter("<end>", position)
			})?;
			f(data);
			if data.is_empty() {
				self.exact_match_data = None
			}
			return Ok(self.is_empty());
		};

		match current_segment {
			| TopicFilterItem::Literal(s) => {
				let child_node =
					self.exact_children.get_mut(s).ok_or_else(|| {
						TopicMatcherError::unknown_filter(s.as_str(), position)
					})?;
				if child_node.update_node(rest_segments, position + 1, f)? {
					self.exact_children.remove(s);
					return Ok(self.is_empty());
				}
			}
			| TopicFilterItem::SingleLevel => {
				let child_node = self
					.single_level_wildcard_node
					.as_mut()
					.ok_or_else(|| {
						TopicMatcherError::unknown_filter("+", position)
					})?;
				if child_node.update_node(rest_segments, position + 1, f)? {
					self.single_level_wildcard_node = None;
					return Ok(self.is_empty());
				}
			}
			| TopicFilterItem::MultiLevel => {
				let hash_wildcard_data = self
					.multi_level_wildcard_data
					.as_mut()
					.ok_or_else(|| {
						TopicMatcherError::unknown_filter("#", position)
					})?;
				f(hash_wildcard_data);
				if hash_wildcard_data.is_empty() {
					self.multi_level_wildcard_data = None;
					return Ok(self.is_empty());
				}
			}
		}
		Ok(false)
	}

	fn collect_matching<'a>(
		&'a self,
		topic: &[Substr],
		wildcards_allowed: bool,
		matching_data: &mut Vec<&'a T>,
	) {
		match topic {
			| [] => {
				matching_data.extend(self.exact_match_data.iter());
				// `a/#` also matches `a`
				matching_data.extend(self.multi_level_wildcard_data.iter());
			}
			| [segment, remaining_segments @ ..] => {
				if let Some(child) = self.exact_children.get(segment) {
					child.collect_matching(
						remaining_segments,
						true,
						matching_data,
					);
				}
				if !wildcards_allowed {
					return;
				}
				if let Some(plus_node) = &self.single_level_wildcard_node {
					plus_node.collect_matching(
						remaining_segments,
						true,
						matching_data,
					);
				}
				matching_data.extend(self.multi_level_wildcard_data.iter());
			}
		}
	}

	/// Finds all data slots whose filter matches `topic`.
	///
	/// A `$`-prefixed first level is only reachable through a literal.
	pub fn find_by_path<'a>(&'a self, topic: &TopicPath) -> Vec<&'a T> {
		let mut matching = Vec::new();
		self.collect_matching(
			topic.segments(),
			!topic.is_reserved(),
			&mut matching,
		);
		matching
	}
}
