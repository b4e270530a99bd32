//! Connection lifecycle states

use std::fmt;

use super::error::ConnectionError;
use crate::session::SessionEvent;

/// Lifecycle state of the managed connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
	/// No session, or the session went away
	#[default]
	Offline,
	/// A session was opened and has not connected yet
	Connecting,
	/// The broker accepted the connection
	Connected,
	/// The session lost the broker and is retrying
	Reconnecting,
	/// The session reported a failure; it may still recover
	Errored(ConnectionError),
}

impl ConnectionState {
	/// Short name without the error detail.
	pub fn as_str(&self) -> &'static str {
		match self {
			| ConnectionState::Offline => "Offline",
			| ConnectionState::Connecting => "Connecting",
			| ConnectionState::Connected => "Connected",
			| ConnectionState::Reconnecting => "Reconnecting",
			| ConnectionState::Errored(_) => "Errored",
		}
	}

	/// True only in `Connected`.
	pub fn is_connected(&self) -> bool {
		matches!(self, ConnectionState::Connected)
	}

	/// True while a connection attempt is underway.
	pub fn is_connecting(&self) -> bool {
		matches!(
			self,
			ConnectionState::Connecting | ConnectionState::Reconnecting
		)
	}

	/// State reached by applying a lifecycle `event`.
	///
	/// `None` means the event is ignored. `first_connect_seen` tells whether
	/// the current session already reported a connect.
	pub(crate) fn next(
		&self,
		event: &SessionEvent,
		first_connect_seen: bool,
	) -> Option<ConnectionState> {
		match event {
			| SessionEvent::Connect { .. } => {
				if first_connect_seen && self.is_connected() {
					None
				} else {
					Some(ConnectionState::Connected)
				}
			}
			| SessionEvent::Reconnect => match self {
				| ConnectionState::Reconnecting => None,
				| _ => Some(ConnectionState::Reconnecting),
			},
			| SessionEvent::Error(error) => match self {
				| ConnectionState::Offline => None,
				| ConnectionState::Errored(current) if current == error => {
					None
				}
				| _ => Some(ConnectionState::Errored(error.clone())),
			},
			| SessionEvent::Offline | SessionEvent::End => match self {
				| ConnectionState::Offline => None,
				| _ => Some(ConnectionState::Offline),
			},
			| SessionEvent::Message(_) | SessionEvent::SubscribeAck { .. } => {
				None
			}
		}
	}
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			| ConnectionState::Errored(reason) => {
				write!(f, "Errored ({reason})")
			}
			| other => f.write_str(other.as_str()),
		}
	}
}
