//! Subscriptions and their per-subscription state

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, warn};

use super::error::{RegistryError, SubscribeRejected};
use super::registry::RegistryShared;
use crate::message::Message;
use crate::session::{AckToken, BrokerSession, QoS, SubscribeRequest};
use crate::topic::TopicFilterSet;

/// Identifier of a subscription, unique within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
	/// Wraps a raw id.
	pub const fn new(id: u64) -> Self {
		Self(id)
	}

	/// The raw id.
	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Per-subscription options sent with the subscribe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOptions {
	/// Requested quality of service
	pub qos: QoS,
}

impl Default for SubscribeOptions {
	fn default() -> Self {
		Self {
			qos: QoS::AtLeastOnce,
		}
	}
}

impl SubscribeOptions {
	/// Sets the requested QoS.
	pub fn with_qos(mut self, qos: QoS) -> Self {
		self.qos = qos;
		self
	}
}

/// Where a subscription stands with the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
	/// Waiting for a connection to send the request
	Pending,
	/// Request sent, no answer yet
	Requested,
	/// Broker granted the request
	Active,
	/// Broker refused the request
	Rejected(SubscribeRejected),
}

impl SubscriptionStatus {
	/// Messages are delivered in `Requested` and `Active`.
	pub fn receives_messages(&self) -> bool {
		matches!(
			self,
			SubscriptionStatus::Requested | SubscriptionStatus::Active
		)
	}
}

/// Result passed to subscribe-result listeners.
pub type SubscribeResult = Result<(), SubscribeRejected>;

type MessageListener = Arc<dyn Fn(&Message) + Send + Sync>;
type ResultListener = Arc<dyn Fn(&SubscribeResult) + Send + Sync>;

struct Progress {
	status: SubscriptionStatus,
	/// Number of requests sent; acks for older attempts are stale
	attempt: u32,
	/// Connection generation the last request went out on
	issued_on: Option<u64>,
	/// Removed from the registry; nothing more is sent
	retired: bool,
}

pub(crate) struct SubscriptionEntry {
	id: SubscriptionId,
	filters: TopicFilterSet,
	options: SubscribeOptions,
	progress: Mutex<Progress>,
	message_listeners: Mutex<Vec<MessageListener>>,
	result_listeners: Mutex<Vec<ResultListener>>,
	/// Held while delivering, so closing waits out in-flight callbacks
	gate: ReentrantMutex<()>,
	removed: AtomicBool,
}

impl SubscriptionEntry {
	pub(crate) fn new(
		id: SubscriptionId,
		filters: TopicFilterSet,
		options: SubscribeOptions,
	) -> Self {
		Self {
			id,
			filters,
			options,
			progress: Mutex::new(Progress {
				status: SubscriptionStatus::Pending,
				attempt: 0,
				issued_on: None,
				retired: false,
			}),
			message_listeners: Mutex::new(Vec::new()),
			result_listeners: Mutex::new(Vec::new()),
			gate: ReentrantMutex::new(()),
			removed: AtomicBool::new(false),
		}
	}

	pub(crate) fn id(&self) -> SubscriptionId {
		self.id
	}

	pub(crate) fn filters(&self) -> &TopicFilterSet {
		&self.filters
	}

	pub(crate) fn status(&self) -> SubscriptionStatus {
		self.progress.lock().status.clone()
	}

	pub(crate) fn is_removed(&self) -> bool {
		self.removed.load(Ordering::Acquire)
	}

	pub(crate) fn add_message_listener(
		&self,
		listener: MessageListener,
	) -> Result<(), RegistryError> {
		let mut listeners = self.message_listeners.lock();
		if self.is_removed() {
			return Err(RegistryError::SubscriptionNotFound(self.id));
		}
		listeners.push(listener);
		Ok(())
	}

	pub(crate) fn add_result_listener(
		&self,
		listener: ResultListener,
	) -> Result<(), RegistryError> {
		let mut listeners = self.result_listeners.lock();
		if self.is_removed() {
			return Err(RegistryError::SubscriptionNotFound(self.id));
		}
		listeners.push(listener);
		Ok(())
	}

	/// Sends the request if this connection needs it.
	///
	/// Never-sent, rejected and unanswered requests always go out; granted
	/// ones only when `reassert` is set. At most one request per `link`.
	pub(crate) fn issue_on_connect(
		&self,
		session: &dyn BrokerSession,
		link: u64,
		reassert: bool,
	) {
		let mut progress = self.progress.lock();
		let needed = match progress.status {
			| SubscriptionStatus::Active => reassert,
			| _ => true,
		};
		if needed {
			self.send_request(&mut progress, session, link);
		}
	}

	/// Sends the request now unless it already went out on `link`.
	pub(crate) fn issue(&self, session: &dyn BrokerSession, link: u64) {
		let mut progress = self.progress.lock();
		self.send_request(&mut progress, session, link);
	}

	/// Makes a rejected subscription eligible again. Returns false if the
	/// subscription is in another state.
	pub(crate) fn reset_rejected(&self) -> bool {
		let mut progress = self.progress.lock();
		if !matches!(progress.status, SubscriptionStatus::Rejected(_)) {
			return false;
		}
		progress.status = SubscriptionStatus::Pending;
		progress.issued_on = None;
		true
	}

	fn send_request(
		&self,
		progress: &mut Progress,
		session: &dyn BrokerSession,
		link: u64,
	) {
		if progress.retired || progress.issued_on == Some(link) {
			return;
		}
		progress.attempt += 1;
		let request = SubscribeRequest {
			token: AckToken {
				subscription: self.id,
				attempt: progress.attempt,
			},
			filters: self
				.filters
				.iter()
				.map(|filter| (filter.as_arcstr(), self.options.qos))
				.collect(),
		};

		match session.subscribe(request) {
			| Ok(()) => {
				debug!(subscription_id = %self.id, attempt = progress.attempt, link = link, "Subscribe request sent");
				progress.issued_on = Some(link);
				if progress.status != SubscriptionStatus::Active {
					progress.status = SubscriptionStatus::Requested;
				}
			}
			| Err(err) => {
				warn!(subscription_id = %self.id, error = %err, "Failed to send subscribe request, will retry on next connect");
				progress.issued_on = None;
				progress.status = SubscriptionStatus::Pending;
			}
		}
	}

	/// Records the broker's answer. Returns the result to report, or `None`
	/// for stale acknowledgements.
	pub(crate) fn acknowledge(
		&self,
		token: AckToken,
		granted: Result<(), SubscribeRejected>,
	) -> Option<SubscribeResult> {
		let mut progress = self.progress.lock();
		if progress.retired || token.attempt != progress.attempt {
			debug!(subscription_id = %self.id, attempt = token.attempt, current = progress.attempt, "Ignoring stale subscribe acknowledgement");
			return None;
		}
		progress.status = match &granted {
			| Ok(()) => SubscriptionStatus::Active,
			| Err(rejected) => SubscriptionStatus::Rejected(rejected.clone()),
		};
		Some(granted)
	}

	/// Calls the result listeners unless the subscription was removed.
	pub(crate) fn notify_result(&self, result: &SubscribeResult) {
		let _gate = self.gate.lock();
		let listeners = self.result_listeners.lock().clone();
		for listener in listeners {
			if self.is_removed() {
				return;
			}
			listener(result);
		}
	}

	/// Calls the message listeners in registration order.
	pub(crate) fn deliver(&self, message: &Message) {
		let _gate = self.gate.lock();
		if self.is_removed() || !self.status().receives_messages() {
			return;
		}
		let listeners = self.message_listeners.lock().clone();
		for listener in listeners {
			// A listener may remove its own subscription
			if self.is_removed() {
				return;
			}
			listener(message);
		}
	}

	/// Stops sending requests.
	pub(crate) fn retire(&self) {
		self.progress.lock().retired = true;
	}

	/// Waits for in-flight callbacks, then drops all listeners.
	pub(crate) fn close(&self) {
		let _gate = self.gate.lock();
		self.removed.store(true, Ordering::Release);
		self.message_listeners.lock().clear();
		self.result_listeners.lock().clear();
	}
}

/// A live subscription.
///
/// Receives messages whose topic matches any of its filters through the
/// listeners added with [`on_message`](Self::on_message). Dropping the
/// handle unsubscribes.
pub struct Subscription {
	entry: Arc<SubscriptionEntry>,
	registry: Arc<RegistryShared>,
}

impl Subscription {
	pub(crate) fn new(
		entry: Arc<SubscriptionEntry>,
		registry: Arc<RegistryShared>,
	) -> Self {
		Self { entry, registry }
	}

	pub(crate) fn entry(&self) -> &Arc<SubscriptionEntry> {
		&self.entry
	}

	/// Registry-unique id.
	pub fn id(&self) -> SubscriptionId {
		self.entry.id
	}

	/// Filters this subscription was registered with.
	pub fn filters(&self) -> &TopicFilterSet {
		&self.entry.filters
	}

	/// Options sent with the subscribe request.
	pub fn options(&self) -> SubscribeOptions {
		self.entry.options
	}

	/// Current status with the broker.
	pub fn status(&self) -> SubscriptionStatus {
		self.entry.status()
	}

	/// True while messages are being delivered to this subscription.
	pub fn is_active(&self) -> bool {
		!self.entry.is_removed() && self.entry.status().receives_messages()
	}

	/// True once unsubscribed, or after the connection was stopped.
	pub fn is_closed(&self) -> bool {
		self.entry.is_removed()
	}

	/// Adds a message listener. Listeners are called in registration order.
	pub fn on_message(
		&self,
		listener: impl Fn(&Message) + Send + Sync + 'static,
	) -> Result<(), RegistryError> {
		self.entry.add_message_listener(Arc::new(listener))
	}

	/// Adds a listener for the broker's answers to subscribe requests.
	pub fn on_subscribe_result(
		&self,
		listener: impl Fn(&SubscribeResult) + Send + Sync + 'static,
	) -> Result<(), RegistryError> {
		self.entry.add_result_listener(Arc::new(listener))
	}

	/// Removes the subscription. No listener runs after this returns.
	pub fn unsubscribe(self) {
		drop(self)
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.registry.remove(&self.entry);
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.entry.id)
			.field("filters", &self.entry.filters)
			.field("status", &self.entry.status())
			.finish()
	}
}
