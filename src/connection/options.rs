//! Connection configuration

use std::time::Duration;

use serde::Deserialize;

/// Options for opening a broker session.
///
/// Every field has a default, so partial documents deserialize:
///
/// ```rust
/// use mqtt_session::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
/// 	.with_client_id("dashboard")
/// 	.with_keep_alive_secs(30);
/// assert_eq!(options.keep_alive().as_secs(), 30);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
	/// Client identifier; generated when absent
	pub client_id: Option<String>,
	/// Keep-alive interval in seconds
	pub keep_alive_secs: u64,
	/// Ask the broker to drop any previous session state
	pub clean_session: bool,
	/// Username and password, if the broker wants them
	pub credentials: Option<Credentials>,
	/// When established subscriptions are sent again
	pub resubscribe: ResubscribePolicy,
	/// Capacity of the outgoing request queue
	pub request_channel_capacity: usize,
	/// Retry behavior of the session's event loop
	pub reconnect: ReconnectSettings,
}

impl Default for ConnectionOptions {
	fn default() -> Self {
		Self {
			client_id: None,
			keep_alive_secs: 60,
			clean_session: true,
			credentials: None,
			resubscribe: ResubscribePolicy::default(),
			request_channel_capacity: 10,
			reconnect: ReconnectSettings::default(),
		}
	}
}

impl ConnectionOptions {
	/// Keep-alive as a duration.
	pub fn keep_alive(&self) -> Duration {
		Duration::from_secs(self.keep_alive_secs)
	}

	/// Sets the client identifier.
	pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());
		self
	}

	/// Sets the keep-alive interval.
	pub fn with_keep_alive_secs(mut self, secs: u64) -> Self {
		self.keep_alive_secs = secs;
		self
	}

	/// Sets the clean-session flag.
	pub fn with_clean_session(mut self, clean_session: bool) -> Self {
		self.clean_session = clean_session;
		self
	}

	/// Sets username and password.
	pub fn with_credentials(
		mut self,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		self.credentials = Some(Credentials {
			username: username.into(),
			password: password.into(),
		});
		self
	}

	/// Sets the resubscribe policy.
	pub fn with_resubscribe(mut self, policy: ResubscribePolicy) -> Self {
		self.resubscribe = policy;
		self
	}

	/// Sets the request queue capacity.
	pub fn with_request_channel_capacity(mut self, capacity: usize) -> Self {
		self.request_channel_capacity = capacity;
		self
	}

	/// Sets the reconnect settings.
	pub fn with_reconnect(mut self, reconnect: ReconnectSettings) -> Self {
		self.reconnect = reconnect;
		self
	}
}

/// Username/password pair.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
	/// User name
	pub username: String,
	/// Password
	pub password: String,
}

impl std::fmt::Debug for Credentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Credentials")
			.field("username", &self.username)
			.field("password", &"***")
			.finish()
	}
}

/// Which transitions into `Connected` resend established subscriptions.
///
/// Subscriptions that were never sent, or were rejected, go out on every
/// fresh connection regardless of the policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResubscribePolicy {
	/// Resend on every connection
	#[default]
	EveryConnect,
	/// Resend only when the broker kept no session state
	SessionReset,
}

impl ResubscribePolicy {
	/// Whether established subscriptions must be resent after a connect
	/// acknowledgement with the given `session_present` flag.
	pub fn reassert_on(self, session_present: bool) -> bool {
		match self {
			| ResubscribePolicy::EveryConnect => true,
			| ResubscribePolicy::SessionReset => !session_present,
		}
	}
}

/// Backoff between failed polls of the session's event loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
	/// Delay after the first failure
	pub initial_delay_ms: u64,
	/// Upper bound for the delay
	pub max_delay_ms: u64,
	/// Give up after this many failures in a row; `None` retries forever
	pub max_consecutive_errors: Option<u32>,
}

impl Default for ReconnectSettings {
	fn default() -> Self {
		Self {
			initial_delay_ms: 100,
			max_delay_ms: 30_000,
			max_consecutive_errors: Some(10),
		}
	}
}

impl ReconnectSettings {
	/// Delay before the next attempt after `error_count` failures in a row.
	pub fn delay_for(&self, error_count: u32) -> Duration {
		let exponent = error_count.saturating_sub(1).min(10);
		let delay = self.initial_delay_ms.saturating_mul(1 << exponent);
		Duration::from_millis(delay.min(self.max_delay_ms))
	}

	/// True once `error_count` reached the configured limit.
	pub fn exhausted(&self, error_count: u32) -> bool {
		self.max_consecutive_errors
			.is_some_and(|max| error_count >= max)
	}
}
