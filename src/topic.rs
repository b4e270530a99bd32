//! Topic handling module
//!
//! Parsing and validation of topic filters, the filter/topic matching rules,
//! and the index tree used to find every filter matching a topic.

// Submodules
pub mod error;
pub mod topic_filter;
pub mod topic_filter_item;
pub mod topic_matcher;
pub mod topic_path;

#[cfg(test)]
mod topic_filter_tests;
#[cfg(test)]
mod topic_matcher_tests;

// Re-export commonly used types for convenience
pub use error::{TopicError, TopicResult, limits, validation};
pub use topic_filter::{
	IntoTopicFilters, LEVEL_SEPARATOR, TopicFilter, TopicFilterSet, matches,
};
pub use topic_filter_item::{TopicFilterError, TopicFilterItem};
pub use topic_matcher::{IsEmpty, TopicMatcherError, TopicMatcherNode};
pub use topic_path::TopicPath;
