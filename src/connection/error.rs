//! Connection error types

use thiserror::Error;

/// Why a connection is unusable.
///
/// Carried by [`ConnectionState::Errored`](super::ConnectionState) so it is
/// cheap to clone and comparable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
	/// Network or protocol failure reported by the session
	#[error("Transport error: {0}")]
	Transport(String),

	/// The broker refused the connection
	#[error("Connection rejected by broker: {0}")]
	Rejected(String),

	/// Broker URL or options could not be turned into a session
	#[error("Invalid connection options: {0}")]
	InvalidOptions(String),

	/// The session could not be started at all
	#[error("Session unavailable: {0}")]
	Unavailable(String),
}

impl ConnectionError {
	/// Creates a new Transport error
	pub fn transport(detail: impl ToString) -> Self {
		Self::Transport(detail.to_string())
	}

	/// Creates a new Rejected error
	pub fn rejected(detail: impl ToString) -> Self {
		Self::Rejected(detail.to_string())
	}

	/// Creates a new InvalidOptions error
	pub fn invalid_options(detail: impl ToString) -> Self {
		Self::InvalidOptions(detail.to_string())
	}

	/// Creates a new Unavailable error
	pub fn unavailable(detail: impl ToString) -> Self {
		Self::Unavailable(detail.to_string())
	}
}

/// Errors returned by [`ConnectionManager`](super::ConnectionManager)
/// operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
	/// The manager was stopped and accepts no more work
	#[error("Connection manager is shut down")]
	ShutdownInProgress,
}
