//! Concrete topics split into levels

use std::fmt;

use arcstr::{ArcStr, Substr};
use smallvec::SmallVec;

/// A concrete topic split into its levels.
///
/// Levels are `Substr` views into the shared topic string, so splitting
/// does not copy.
#[derive(Debug, Clone)]
pub struct TopicPath {
	path: ArcStr,
	segments: SmallVec<[Substr; 8]>,
}

impl TopicPath {
	/// Splits `path` on the level separator.
	pub fn new(path: impl Into<ArcStr>) -> Self {
		let path = path.into();
		let segments = path.split('/').map(|s| path.substr_from(s)).collect();
		Self { path, segments }
	}

	/// The full topic string.
	pub fn as_str(&self) -> &str {
		&self.path
	}

	/// Shared handle to the full topic string.
	pub fn path(&self) -> ArcStr {
		self.path.clone()
	}

	/// Levels in order.
	pub fn segments(&self) -> &[Substr] {
		&self.segments
	}

	/// Broker-reserved topics (`$SYS/...`) are only matched literally at
	/// their first level.
	pub fn is_reserved(&self) -> bool {
		self.path.starts_with('$')
	}
}

impl fmt::Display for TopicPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.path)
	}
}

impl From<&str> for TopicPath {
	fn from(path: &str) -> Self {
		Self::new(path)
	}
}

impl From<ArcStr> for TopicPath {
	fn from(path: ArcStr) -> Self {
		Self::new(path)
	}
}
