//! Broker session seam
//!
//! The [`ConnectionManager`](crate::ConnectionManager) never talks to the
//! network itself. It asks a [`SessionConnector`] to open a
//! [`BrokerSession`], and the session reports everything that happens on the
//! wire back through a [`SessionEventSink`].
//!
//! [`rumqtt::RumqttConnector`] is the production implementation.

pub mod rumqtt;

use std::fmt;
use std::sync::{Arc, Weak};

use arcstr::ArcStr;
pub use rumqttc::QoS;
use thiserror::Error;

use crate::connection::manager::ManagerShared;
use crate::connection::{ConnectionError, ConnectionOptions};
use crate::message::Message;
use crate::routing::{SubscribeRejected, SubscriptionId};

/// Opens broker sessions.
pub trait SessionConnector: Send + Sync + 'static {
	/// Starts a session for `broker_url`.
	///
	/// Must not block on the network and must not call `events`
	/// synchronously. Connection progress is reported through `events`.
	fn open(
		&self,
		broker_url: &str,
		options: &ConnectionOptions,
		events: SessionEventSink,
	) -> Result<Arc<dyn BrokerSession>, ConnectionError>;
}

/// One live session with a broker.
///
/// Commands are queued, never awaited, and must not report events
/// synchronously.
pub trait BrokerSession: Send + Sync + 'static {
	/// Queues a SUBSCRIBE for the request's filters.
	fn subscribe(&self, request: SubscribeRequest) -> Result<(), SessionError>;

	/// Queues an UNSUBSCRIBE for `filters`.
	fn unsubscribe(&self, filters: Vec<ArcStr>) -> Result<(), SessionError>;

	/// Ends the session. `force` drops it without a clean disconnect.
	fn end(&self, force: bool);
}

/// Identifies one subscribe request so its acknowledgement can be matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckToken {
	/// Subscription the request was made for
	pub subscription: SubscriptionId,
	/// Attempt number; older attempts are stale
	pub attempt: u32,
}

/// Filters to subscribe to, tagged with the token to acknowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
	/// Token the acknowledgement must carry
	pub token: AckToken,
	/// Filters with their requested QoS
	pub filters: Vec<(ArcStr, QoS)>,
}

/// Broker answer to a subscribe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
	/// Every filter was granted, with these QoS levels
	Granted(Vec<QoS>),
	/// At least one filter was refused
	Rejected(SubscribeRejected),
}

/// Something that happened on a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
	/// The broker acknowledged the connection
	Connect {
		/// The broker kept state from a previous session
		session_present: bool,
	},
	/// The session is about to retry after losing the broker
	Reconnect,
	/// A failure; the session keeps running unless it also ends
	Error(ConnectionError),
	/// The broker is unreachable
	Offline,
	/// The session is finished and will report nothing more
	End,
	/// An application message arrived
	Message(Message),
	/// A subscribe request was answered
	SubscribeAck {
		/// Token of the request being answered
		token: AckToken,
		/// What the broker granted
		outcome: SubscribeOutcome,
	},
}

/// Where a session reports its events.
///
/// Tagged with the identity of the session it was handed to, so events
/// from a replaced session are dropped. Holds the manager weakly: emitting
/// after the manager is gone does nothing.
#[derive(Clone)]
pub struct SessionEventSink {
	shared: Weak<ManagerShared>,
	epoch: u64,
}

impl SessionEventSink {
	pub(crate) fn new(shared: Weak<ManagerShared>, epoch: u64) -> Self {
		Self { shared, epoch }
	}

	/// Delivers `event` to the manager on the calling thread.
	pub fn emit(&self, event: SessionEvent) {
		if let Some(shared) = self.shared.upgrade() {
			shared.handle_event(self.epoch, event);
		}
	}

	/// True while the manager that created this sink is alive.
	pub fn is_attached(&self) -> bool {
		self.shared.strong_count() > 0
	}
}

impl fmt::Debug for SessionEventSink {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionEventSink")
			.field("epoch", &self.epoch)
			.field("attached", &self.is_attached())
			.finish()
	}
}

/// A session command could not be queued.
#[derive(Error, Debug)]
pub enum SessionError {
	/// The session's request queue rejected the command
	#[error("Failed to queue request: {0}")]
	Client(#[from] rumqttc::ClientError),

	/// The session has already ended
	#[error("Session is closed")]
	Closed,
}
