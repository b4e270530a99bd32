//! Subscription registry

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

use arcstr::ArcStr;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::RegistryError;
use super::subscription::{
	SubscribeOptions, SubscribeResult, Subscription, SubscriptionEntry,
	SubscriptionId,
};
use crate::connection::ConnectionManager;
use crate::connection::manager::{ConnectionObserver, Transition};
use crate::message::Message;
use crate::session::{AckToken, SubscribeOutcome};
use crate::topic::{IntoTopicFilters, TopicMatcherNode, TopicPath, validation};

/// Registry tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
	/// Number of topics whose matching subscriptions are cached; 0 disables
	/// the cache
	pub topic_cache_size: usize,
}

impl Default for RegistrySettings {
	fn default() -> Self {
		Self {
			topic_cache_size: 128,
		}
	}
}

impl RegistrySettings {
	/// Sets the topic cache size.
	pub fn with_topic_cache_size(mut self, size: usize) -> Self {
		self.topic_cache_size = size;
		self
	}
}

struct RegistryTable {
	entries: BTreeMap<SubscriptionId, Arc<SubscriptionEntry>>,
	index: TopicMatcherNode<BTreeSet<SubscriptionId>>,
	/// Live subscriptions per filter string
	filter_refs: HashMap<ArcStr, usize>,
	match_cache: Option<LruCache<ArcStr, Arc<[SubscriptionId]>>>,
	next_id: u64,
	closed: bool,
}

impl RegistryTable {
	fn invalidate_cache(&mut self) {
		if let Some(cache) = &mut self.match_cache {
			cache.clear();
		}
	}

	/// Ids of subscriptions matching `topic`, ascending and without
	/// duplicates.
	fn matching_ids(&mut self, topic: &ArcStr) -> Arc<[SubscriptionId]> {
		if let Some(ids) =
			self.match_cache.as_mut().and_then(|cache| cache.get(topic))
		{
			return ids.clone();
		}
		let path = TopicPath::new(topic.clone());
		let ids: Arc<[SubscriptionId]> = self
			.index
			.find_by_path(&path)
			.into_iter()
			.flatten()
			.copied()
			.collect::<BTreeSet<_>>()
			.into_iter()
			.collect();
		if let Some(cache) = &mut self.match_cache {
			cache.put(topic.clone(), ids.clone());
		}
		ids
	}

	/// Drops `entry` from the index. Returns the filters no live
	/// subscription uses any more.
	fn release(&mut self, entry: &SubscriptionEntry) -> Vec<ArcStr> {
		let mut released = Vec::new();
		for filter in entry.filters() {
			let id = entry.id();
			if let Err(err) = self.index.update(filter, |ids| {
				ids.remove(&id);
			}) {
				warn!(subscription_id = %id, filter = %filter, error = %err, "Filter missing from index");
			}

			let key = filter.as_arcstr();
			if let Some(count) = self.filter_refs.get_mut(&key) {
				*count -= 1;
				if *count == 0 {
					self.filter_refs.remove(&key);
					released.push(key);
				}
			}
		}
		self.invalidate_cache();
		released
	}
}

pub(crate) struct RegistryShared {
	connection: ConnectionManager,
	table: Mutex<RegistryTable>,
}

impl RegistryShared {
	/// Removes `entry`, unsubscribes filters nobody else uses and waits out
	/// in-flight callbacks. Idempotent.
	pub(crate) fn remove(&self, entry: &Arc<SubscriptionEntry>) {
		entry.retire();
		{
			let mut table = self.table.lock();
			if table.entries.remove(&entry.id()).is_some() {
				let released = table.release(entry);
				// Queued under the table lock so a later subscribe to the same
				// filter is sent after this unsubscribe
				if !released.is_empty() {
					self.send_unsubscribe(released);
				}
				debug!(subscription_id = %entry.id(), "Subscription removed");
			}
		}
		entry.close();
	}

	fn send_unsubscribe(&self, filters: Vec<ArcStr>) {
		let snapshot = self.connection.snapshot();
		let Some(session) = snapshot.session() else {
			return;
		};
		if !snapshot.state().is_connected() {
			return;
		}
		debug!(filters = ?filters, "Unsubscribing released filters");
		if let Err(err) = session.unsubscribe(filters) {
			warn!(error = %err, "Failed to send unsubscribe request");
		}
	}

	fn entry(&self, id: SubscriptionId) -> Option<Arc<SubscriptionEntry>> {
		self.table.lock().entries.get(&id).cloned()
	}

	fn live_entries(&self) -> Vec<Arc<SubscriptionEntry>> {
		self.table.lock().entries.values().cloned().collect()
	}
}

impl ConnectionObserver for RegistryShared {
	fn on_transition(&self, transition: &Transition) {
		if !transition.state.is_connected() {
			return;
		}
		let Some(session) = &transition.session else {
			warn!("Connected without a session handle");
			return;
		};
		let entries = self.live_entries();
		debug!(
			link = transition.link,
			reassert = transition.reassert,
			subscriptions = entries.len(),
			"Issuing subscriptions after connect"
		);
		for entry in entries {
			entry.issue_on_connect(
				session.as_ref(),
				transition.link,
				transition.reassert,
			);
		}
	}

	fn on_message(&self, message: &Message) {
		if !self.connection.status().is_connected() {
			debug!(topic = %message.topic(), "Dropping message received while not connected");
			return;
		}
		if let Err(err) = validation::validate_topic(message.topic()) {
			warn!(error = %err, "Dropping message with invalid topic");
			return;
		}

		let targets = {
			let mut table = self.table.lock();
			let ids = table.matching_ids(message.topic());
			ids.iter()
				.filter_map(|id| table.entries.get(id).cloned())
				.collect::<Vec<_>>()
		};
		if targets.is_empty() {
			debug!(topic = %message.topic(), "No subscription matches message");
			return;
		}
		for entry in targets {
			entry.deliver(message);
		}
	}

	fn on_subscribe_ack(&self, token: AckToken, outcome: &SubscribeOutcome) {
		let Some(entry) = self.entry(token.subscription) else {
			debug!(subscription_id = %token.subscription, "Acknowledgement for removed subscription");
			return;
		};
		let granted = match outcome {
			| SubscribeOutcome::Granted(_) => Ok(()),
			| SubscribeOutcome::Rejected(rejected) => Err(rejected.clone()),
		};
		if let Some(result) = entry.acknowledge(token, granted) {
			match &result {
				| Ok(()) => {
					info!(subscription_id = %entry.id(), "Subscription active")
				}
				| Err(rejected) => {
					warn!(subscription_id = %entry.id(), reason = rejected.reason(), "Subscription rejected")
				}
			}
			entry.notify_result(&result);
		}
	}

	fn on_shutdown(&self) {
		let entries = {
			let mut table = self.table.lock();
			table.closed = true;
			table.filter_refs.clear();
			table.invalidate_cache();
			table.index = TopicMatcherNode::new();
			std::mem::take(&mut table.entries)
		};
		debug!(subscriptions = entries.len(), "Closing subscriptions on shutdown");
		for entry in entries.into_values() {
			entry.retire();
			entry.close();
		}
	}
}

/// Routes inbound messages to subscriptions by topic filter.
///
/// Subscriptions survive reconnects: pending ones are sent as soon as the
/// connection is up, established ones are sent again according to the
/// connection's [`ResubscribePolicy`](crate::ResubscribePolicy).
///
/// ```rust,no_run
/// use mqtt_session::{
/// 	ConnectionManager, RumqttConnector, SubscribeOptions,
/// 	SubscriptionRegistry,
/// };
///
/// # fn demo() -> mqtt_session::Result<()> {
/// let manager = ConnectionManager::new(RumqttConnector::new());
/// let registry = SubscriptionRegistry::new(&manager);
///
/// let subscription =
/// 	registry.subscribe("sensors/+/temp", SubscribeOptions::default())?;
/// subscription.on_message(|message| {
/// 	println!("{} = {}", message.topic(), message.payload_str());
/// })?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SubscriptionRegistry {
	shared: Arc<RegistryShared>,
}

impl SubscriptionRegistry {
	/// Creates a registry fed by `connection`.
	pub fn new(connection: &ConnectionManager) -> Self {
		Self::with_settings(connection, RegistrySettings::default())
	}

	/// Creates a registry with custom settings.
	pub fn with_settings(
		connection: &ConnectionManager,
		settings: RegistrySettings,
	) -> Self {
		let match_cache =
			NonZeroUsize::new(settings.topic_cache_size).map(LruCache::new);
		let shared = Arc::new(RegistryShared {
			connection: connection.clone(),
			table: Mutex::new(RegistryTable {
				entries: BTreeMap::new(),
				index: TopicMatcherNode::new(),
				filter_refs: HashMap::new(),
				match_cache,
				next_id: 0,
				closed: connection.is_stopped(),
			}),
		});
		let observer: Weak<dyn ConnectionObserver> = Arc::downgrade(&shared) as Weak<RegistryShared>;
		connection.attach(observer);
		Self { shared }
	}

	/// Registers a subscription for `filters`.
	///
	/// Filters are validated before anything is sent. The subscribe request
	/// goes out now if connected, otherwise on the next connect.
	pub fn subscribe(
		&self,
		filters: impl IntoTopicFilters,
		options: SubscribeOptions,
	) -> Result<Subscription, RegistryError> {
		let filters = filters.into_topic_filters()?;
		if self.shared.connection.is_stopped() {
			return Err(RegistryError::ShutdownInProgress);
		}

		let entry = {
			let mut table = self.shared.table.lock();
			if table.closed {
				return Err(RegistryError::ShutdownInProgress);
			}
			table.next_id += 1;
			let id = SubscriptionId::new(table.next_id);
			let entry = Arc::new(SubscriptionEntry::new(id, filters, options));
			for filter in entry.filters() {
				table.index.entry(filter).insert(id);
				*table.filter_refs.entry(filter.as_arcstr()).or_default() += 1;
			}
			table.entries.insert(id, entry.clone());
			table.invalidate_cache();
			entry
		};
		info!(subscription_id = %entry.id(), filters = ?entry.filters(), "Subscription registered");

		self.shared.connection.with_dispatch(|| {
			let snapshot = self.shared.connection.snapshot();
			if !snapshot.state().is_connected() {
				return;
			}
			if let Some(session) = snapshot.session() {
				entry.issue(session.as_ref(), snapshot.link());
			}
		});

		Ok(Subscription::new(entry, self.shared.clone()))
	}

	/// Adds a message listener to `subscription`.
	pub fn on_message(
		&self,
		subscription: &Subscription,
		listener: impl Fn(&Message) + Send + Sync + 'static,
	) -> Result<(), RegistryError> {
		subscription.on_message(listener)
	}

	/// Adds a subscribe-result listener to `subscription`.
	pub fn on_subscribe_result(
		&self,
		subscription: &Subscription,
		listener: impl Fn(&SubscribeResult) + Send + Sync + 'static,
	) -> Result<(), RegistryError> {
		subscription.on_subscribe_result(listener)
	}

	/// Removes `subscription`. No listener of it runs after this returns.
	/// Calling it again does nothing.
	pub fn unsubscribe(&self, subscription: &Subscription) {
		self.shared.remove(subscription.entry());
	}

	/// Sends a rejected subscription again, now if connected, otherwise on
	/// the next connect. Does nothing for subscriptions that were not
	/// rejected.
	pub fn retry(
		&self,
		subscription: &Subscription,
	) -> Result<(), RegistryError> {
		let entry = subscription.entry();
		if entry.is_removed() {
			return Err(RegistryError::SubscriptionNotFound(entry.id()));
		}
		if !entry.reset_rejected() {
			return Ok(());
		}
		debug!(subscription_id = %entry.id(), "Retrying rejected subscription");
		self.shared.connection.with_dispatch(|| {
			let snapshot = self.shared.connection.snapshot();
			if !snapshot.state().is_connected() {
				return;
			}
			if let Some(session) = snapshot.session() {
				entry.issue(session.as_ref(), snapshot.link());
			}
		});
		Ok(())
	}

	/// Number of live subscriptions.
	pub fn len(&self) -> usize {
		self.shared.table.lock().entries.len()
	}

	/// True if there are no live subscriptions.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// The connection this registry listens to.
	pub fn connection(&self) -> &ConnectionManager {
		&self.shared.connection
	}
}

impl std::fmt::Debug for SubscriptionRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SubscriptionRegistry")
			.field("subscriptions", &self.len())
			.finish()
	}
}
