//! Inbound application messages

use std::borrow::Cow;
use std::fmt;

use arcstr::ArcStr;
use bytes::Bytes;

/// A message delivered by the broker.
///
/// Cheap to clone: the topic and the payload are reference counted.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
	topic: ArcStr,
	payload: Bytes,
}

impl Message {
	/// Creates a message for `topic`.
	pub fn new(topic: impl Into<ArcStr>, payload: impl Into<Bytes>) -> Self {
		Self {
			topic: topic.into(),
			payload: payload.into(),
		}
	}

	/// Concrete topic the message was published on.
	pub fn topic(&self) -> &ArcStr {
		&self.topic
	}

	/// Raw payload bytes.
	pub fn payload(&self) -> &Bytes {
		&self.payload
	}

	/// Payload as text, replacing invalid UTF-8 sequences.
	pub fn payload_str(&self) -> Cow<'_, str> {
		String::from_utf8_lossy(&self.payload)
	}
}

impl fmt::Debug for Message {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Message")
			.field("topic", &self.topic)
			.field("payload_size", &self.payload.len())
			.finish()
	}
}
