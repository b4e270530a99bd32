//! # MQTT Session
//!
//! Client-side session management for MQTT brokers: one connection whose
//! lifecycle any number of listeners can follow, and a registry that routes
//! inbound messages to the subscriptions whose topic filters match.
//!
//! ## Features
//!
//! - **Connection lifecycle**: `Offline`, `Connecting`, `Connected`,
//!   `Reconnecting` and `Errored`, published to listeners and `watch`
//!   receivers in order
//! - **Topic filters**: MQTT wildcard matching (`+`, `#`) with the `$` rule
//!   for broker-reserved topics
//! - **Subscription registry**: deferred subscribe while offline,
//!   resubscription after reconnects, fan-out to every matching
//!   subscription
//! - **Pluggable session**: `rumqttc` backed by default, any
//!   [`SessionConnector`] for tests or other transports
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mqtt_session::{
//! 	ConnectionManager, ConnectionOptions, RumqttConnector, SubscribeOptions,
//! 	SubscriptionRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! 	let manager = ConnectionManager::new(RumqttConnector::new());
//! 	let registry = SubscriptionRegistry::new(&manager);
//!
//! 	let _status = manager.on_state_change(|state| {
//! 		println!("connection: {state}");
//! 	});
//!
//! 	let subscription =
//! 		registry.subscribe("sensors/+/temp", SubscribeOptions::default())?;
//! 	subscription.on_message(|message| {
//! 		println!("{}: {}", message.topic(), message.payload_str());
//! 	})?;
//!
//! 	let connection = manager
//! 		.scoped("mqtt://localhost:1883", ConnectionOptions::default())?;
//! 	tokio::signal::ctrl_c().await?;
//! 	drop(connection);
//! 	Ok(())
//! }
//! ```
//!
//! ## Pattern Matching
//!
//! - `+` matches exactly one topic level (e.g., `sensors/+/temperature`)
//! - `#` matches the parent level and everything below it (e.g.,
//!   `sensors/#` matches `sensors` and `sensors/a/b`)
//! - topics starting with `$` are never matched by a leading wildcard

#![warn(missing_docs)]

// Core modules
pub mod connection;
pub mod error;
pub mod message;
pub mod routing;
pub mod session;
pub mod topic;

// === Core Public API ===
pub use connection::{
	ConnectionError, ConnectionManager, ConnectionOptions, ConnectionScope,
	ConnectionSnapshot, ConnectionState, Credentials, ManagerError,
	ReconnectSettings, ResubscribePolicy, StateListenerHandle,
};
pub use error::{Error, Result};
pub use message::Message;
pub use routing::{
	RegistryError, RegistrySettings, SubscribeOptions, SubscribeRejected,
	SubscribeResult, Subscription, SubscriptionId, SubscriptionRegistry,
	SubscriptionStatus,
};
pub use session::rumqtt::RumqttConnector;
pub use topic::{TopicFilter, TopicFilterError, matches};

// Essential external types
pub use rumqttc::QoS;

/// Prelude module for convenient imports
///
/// ```rust
/// use mqtt_session::prelude::*;
/// ```
pub mod prelude {
	//! Essential types for most applications

	pub use crate::{
		ConnectionManager, ConnectionOptions, ConnectionState, Message, QoS,
		Result, RumqttConnector, SubscribeOptions, Subscription,
		SubscriptionRegistry,
	};
}

/// Error types used throughout the library
///
/// ```rust
/// use mqtt_session::errors::*;
/// ```
pub mod errors {
	//! All error types used in the library

	pub use crate::Error;
	pub use crate::connection::{ConnectionError, ManagerError};
	pub use crate::routing::{RegistryError, SubscribeRejected};
	pub use crate::session::SessionError;
	pub use crate::topic::{TopicError, TopicFilterError, TopicMatcherError};
}
