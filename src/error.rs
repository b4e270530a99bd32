//! Crate-level error type

use thiserror::Error;

use crate::connection::{ConnectionError, ManagerError};
use crate::routing::{RegistryError, SubscribeRejected};
use crate::session::SessionError;
use crate::topic::{TopicError, TopicFilterError};

/// Any error produced by this crate
#[derive(Error, Debug)]
pub enum Error {
	/// Connection failure
	#[error(transparent)]
	Connection(#[from] ConnectionError),

	/// Connection manager refused the operation
	#[error(transparent)]
	Manager(#[from] ManagerError),

	/// Subscription registry refused the operation
	#[error(transparent)]
	Registry(#[from] RegistryError),

	/// The broker denied a subscription
	#[error(transparent)]
	Rejected(#[from] SubscribeRejected),

	/// A session command could not be queued
	#[error(transparent)]
	Session(#[from] SessionError),

	/// Topic or filter error
	#[error(transparent)]
	Topic(#[from] TopicError),
}

impl From<TopicFilterError> for Error {
	fn from(err: TopicFilterError) -> Self {
		Error::Registry(RegistryError::InvalidFilter(err))
	}
}

/// Result type alias for operations that may fail with [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
