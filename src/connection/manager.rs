use std::fmt;
use std::mem;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use arcstr::ArcStr;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::error::ManagerError;
use super::listeners::{StateListenerHandle, StateListeners};
use super::options::ConnectionOptions;
use super::state::ConnectionState;
use crate::message::Message;
use crate::session::{
	AckToken, BrokerSession, SessionConnector, SessionEvent, SessionEventSink,
	SubscribeOutcome,
};

/// Receives everything the manager dispatches, in dispatch order.
///
/// Implemented by the subscription registry. Called with the dispatch lock
/// held, so calls never overlap.
pub(crate) trait ConnectionObserver: Send + Sync {
	fn on_transition(&self, transition: &Transition);
	fn on_message(&self, message: &Message);
	fn on_subscribe_ack(&self, token: AckToken, outcome: &SubscribeOutcome);
	fn on_shutdown(&self);
}

/// A published state change.
pub(crate) struct Transition {
	pub(crate) state: ConnectionState,
	pub(crate) session: Option<Arc<dyn BrokerSession>>,
	/// Connection generation, bumped on every transition into `Connected`
	pub(crate) link: u64,
	/// Established subscriptions must be sent again
	pub(crate) reassert: bool,
}

/// Point-in-time view of the connection.
#[derive(Clone, Default)]
pub struct ConnectionSnapshot {
	state: ConnectionState,
	session: Option<Arc<dyn BrokerSession>>,
	link: u64,
}

impl ConnectionSnapshot {
	/// Lifecycle state.
	pub fn state(&self) -> &ConnectionState {
		&self.state
	}

	/// Session handle, present only while usable.
	pub fn session(&self) -> Option<&Arc<dyn BrokerSession>> {
		self.session.as_ref()
	}

	/// Number of transitions into `Connected` so far.
	pub fn link(&self) -> u64 {
		self.link
	}
}

impl fmt::Debug for ConnectionSnapshot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionSnapshot")
			.field("state", &self.state)
			.field("has_session", &self.session.is_some())
			.field("link", &self.link)
			.finish()
	}
}

struct LiveSession {
	epoch: u64,
	handle: Arc<dyn BrokerSession>,
	first_connect_seen: bool,
}

struct ManagerInner {
	state: ConnectionState,
	stopped: bool,
	/// Identity of the most recently opened session
	epoch: u64,
	link: u64,
	broker_url: Option<ArcStr>,
	options: ConnectionOptions,
	session: Option<LiveSession>,
}

impl ManagerInner {
	fn visible_session(&self) -> Option<Arc<dyn BrokerSession>> {
		let usable = matches!(
			self.state,
			ConnectionState::Connected | ConnectionState::Reconnecting
		);
		self.session
			.as_ref()
			.filter(|live| usable && live.first_connect_seen)
			.map(|live| live.handle.clone())
	}

	fn accepts(&self, epoch: u64) -> bool {
		!self.stopped
			&& self.session.as_ref().is_some_and(|live| live.epoch == epoch)
	}
}

pub(crate) struct ManagerShared {
	connector: Box<dyn SessionConnector>,
	/// Serializes event handling with `start` and `stop`
	dispatch: ReentrantMutex<()>,
	inner: Mutex<ManagerInner>,
	snapshot: watch::Sender<ConnectionSnapshot>,
	listeners: Arc<StateListeners>,
	observers: Mutex<Vec<Weak<dyn ConnectionObserver>>>,
}

impl ManagerShared {
	pub(crate) fn handle_event(&self, epoch: u64, event: SessionEvent) {
		let _dispatch = self.dispatch.lock();
		match event {
			| SessionEvent::Message(message) => {
				if !self.inner.lock().accepts(epoch) {
					return;
				}
				for observer in self.observers() {
					observer.on_message(&message);
				}
			}
			| SessionEvent::SubscribeAck { token, outcome } => {
				if !self.inner.lock().accepts(epoch) {
					return;
				}
				for observer in self.observers() {
					observer.on_subscribe_ack(token, &outcome);
				}
			}
			| lifecycle => self.apply_lifecycle(epoch, lifecycle),
		}
	}

	fn apply_lifecycle(&self, epoch: u64, event: SessionEvent) {
		let mut reassert = false;
		let (next, ended) = {
			let mut guard = self.inner.lock();
			let inner = &mut *guard;
			if !inner.accepts(epoch) {
				debug!(epoch = epoch, event = ?event, "Ignoring event from a stale session");
				return;
			}
			let Some(live) = inner.session.as_mut() else {
				return;
			};
			let next = inner.state.next(&event, live.first_connect_seen);

			let mut ended = None;
			match &event {
				| SessionEvent::Connect { session_present } => {
					if next.is_some() {
						live.first_connect_seen = true;
						reassert =
							inner.options.resubscribe.reassert_on(*session_present);
					}
				}
				| SessionEvent::End => ended = inner.session.take(),
				| _ => {}
			}
			(next, ended)
		};

		if ended.is_some() {
			debug!(epoch = epoch, "Session ended");
		}
		match next {
			| Some(state) => self.set_state(state, reassert),
			| None => {
				debug!(epoch = epoch, event = ?event, "Event caused no state change")
			}
		}
	}

	/// Publishes `state` if it differs from the current one, then informs
	/// observers and listeners.
	fn set_state(&self, state: ConnectionState, reassert: bool) {
		let transition = {
			let mut inner = self.inner.lock();
			if inner.state == state {
				return;
			}
			let previous = mem::replace(&mut inner.state, state.clone());
			if state.is_connected() {
				inner.link += 1;
			}
			let session = inner.visible_session();
			self.snapshot.send_replace(ConnectionSnapshot {
				state: state.clone(),
				session: session.clone(),
				link: inner.link,
			});
			info!(from = %previous, to = %state, link = inner.link, "Connection state changed");
			Transition {
				state,
				session,
				link: inner.link,
				reassert: reassert && inner.state.is_connected(),
			}
		};

		for observer in self.observers() {
			observer.on_transition(&transition);
		}
		self.listeners.notify(&transition.state);
	}

	fn observers(&self) -> Vec<Arc<dyn ConnectionObserver>> {
		let mut observers = self.observers.lock();
		observers.retain(|observer| observer.strong_count() > 0);
		observers.iter().filter_map(Weak::upgrade).collect()
	}
}

impl Drop for ManagerShared {
	fn drop(&mut self) {
		let inner = self.inner.get_mut();
		if let Some(live) = inner.session.take() {
			if !inner.stopped {
				error!(
					"ConnectionManager dropped without calling stop(). Please \
					 call stop() before dropping the last handle."
				);
			}
			live.handle.end(true);
		}
	}
}

/// Owns the lifecycle of one broker session.
///
/// Cheap to clone; all clones drive the same connection. State changes are
/// published in order to listeners registered with
/// [`on_state_change`](Self::on_state_change) and to [`watch`](Self::watch)
/// receivers.
///
/// Listeners run synchronously on the thread that delivers the session
/// event. They may call back into the manager, but must not block on
/// another thread that does.
#[derive(Clone)]
pub struct ConnectionManager {
	shared: Arc<ManagerShared>,
}

impl ConnectionManager {
	/// Creates a manager that opens sessions with `connector`.
	pub fn new(connector: impl SessionConnector) -> Self {
		let (snapshot, _) = watch::channel(ConnectionSnapshot::default());
		Self {
			shared: Arc::new(ManagerShared {
				connector: Box::new(connector),
				dispatch: ReentrantMutex::new(()),
				inner: Mutex::new(ManagerInner {
					state: ConnectionState::Offline,
					stopped: false,
					epoch: 0,
					link: 0,
					broker_url: None,
					options: ConnectionOptions::default(),
					session: None,
				}),
				snapshot,
				listeners: Arc::new(StateListeners::default()),
				observers: Mutex::new(Vec::new()),
			}),
		}
	}

	/// Opens a session to `broker_url` unless one is already running.
	///
	/// Does nothing while connecting, connected, reconnecting, or while the
	/// previous session is still alive and retrying on its own. A connector
	/// failure is reported as [`ConnectionState::Errored`], not as an error.
	pub fn start(
		&self,
		broker_url: impl Into<ArcStr>,
		options: ConnectionOptions,
	) -> Result<(), ManagerError> {
		let _dispatch = self.shared.dispatch.lock();
		let broker_url = broker_url.into();
		let epoch = {
			let mut inner = self.shared.inner.lock();
			if inner.stopped {
				return Err(ManagerError::ShutdownInProgress);
			}
			let busy = matches!(
				inner.state,
				ConnectionState::Connecting
					| ConnectionState::Connected
					| ConnectionState::Reconnecting
			);
			if busy || inner.session.is_some() {
				debug!(state = %inner.state, "Session already running, start ignored");
				return Ok(());
			}
			inner.epoch += 1;
			inner.broker_url = Some(broker_url.clone());
			inner.options = options.clone();
			inner.epoch
		};

		info!(broker_url = %broker_url, epoch = epoch, "Opening broker session");
		self.shared.set_state(ConnectionState::Connecting, false);

		let sink = SessionEventSink::new(Arc::downgrade(&self.shared), epoch);
		match self.shared.connector.open(&broker_url, &options, sink) {
			| Ok(handle) => {
				let mut inner = self.shared.inner.lock();
				if inner.stopped || inner.epoch != epoch {
					drop(inner);
					warn!(epoch = epoch, "Manager stopped while opening session");
					handle.end(true);
					return Err(ManagerError::ShutdownInProgress);
				}
				inner.session = Some(LiveSession {
					epoch,
					handle,
					first_connect_seen: false,
				});
			}
			| Err(err) => {
				error!(error = %err, broker_url = %broker_url, "Failed to open broker session");
				self.shared.set_state(ConnectionState::Errored(err), false);
			}
		}
		Ok(())
	}

	/// Current lifecycle state.
	pub fn status(&self) -> ConnectionState {
		self.shared.snapshot.borrow().state.clone()
	}

	/// Session handle, present only after the session's first connect while
	/// `Connected` or `Reconnecting`.
	pub fn current_session(&self) -> Option<Arc<dyn BrokerSession>> {
		self.shared.snapshot.borrow().session.clone()
	}

	/// State, session and connection generation read together.
	pub fn snapshot(&self) -> ConnectionSnapshot {
		self.shared.snapshot.borrow().clone()
	}

	/// Receiver that sees every published snapshot.
	///
	/// The receiver reports closed once the last manager handle is gone.
	pub fn watch(&self) -> watch::Receiver<ConnectionSnapshot> {
		self.shared.snapshot.subscribe()
	}

	/// Registers `listener` for state changes.
	///
	/// Called once per actual change, in order. After [`stop`](Self::stop)
	/// the returned handle is inert.
	pub fn on_state_change(
		&self,
		listener: impl Fn(&ConnectionState) + Send + Sync + 'static,
	) -> StateListenerHandle {
		self.shared.listeners.add(listener)
	}

	/// Ends the session and goes `Offline` for good.
	///
	/// Listeners see at most one final `Offline`, and nothing is delivered
	/// after this returns. Calling it again does nothing.
	pub fn stop(&self) {
		let _dispatch = self.shared.dispatch.lock();
		let (ended, previous, link) = {
			let mut inner = self.shared.inner.lock();
			if inner.stopped {
				return;
			}
			inner.stopped = true;
			inner.epoch += 1;
			let previous =
				mem::replace(&mut inner.state, ConnectionState::Offline);
			self.shared.snapshot.send_replace(ConnectionSnapshot {
				state: ConnectionState::Offline,
				session: None,
				link: inner.link,
			});
			(inner.session.take(), previous, inner.link)
		};

		if let Some(live) = ended {
			live.handle.end(true);
		}
		info!(from = %previous, "Connection manager stopped");

		let observers = self.shared.observers();
		if previous != ConnectionState::Offline {
			let transition = Transition {
				state: ConnectionState::Offline,
				session: None,
				link,
				reassert: false,
			};
			for observer in &observers {
				observer.on_transition(&transition);
			}
			self.shared.listeners.notify(&ConnectionState::Offline);
		}
		for observer in &observers {
			observer.on_shutdown();
		}
		self.shared.listeners.clear();
		self.shared.observers.lock().clear();
	}

	/// True once [`stop`](Self::stop) was called.
	pub fn is_stopped(&self) -> bool {
		self.shared.inner.lock().stopped
	}

	/// URL passed to the last accepted [`start`](Self::start).
	pub fn broker_url(&self) -> Option<ArcStr> {
		self.shared.inner.lock().broker_url.clone()
	}

	/// Starts the connection and returns a guard that stops it on drop.
	pub fn scoped(
		&self,
		broker_url: impl Into<ArcStr>,
		options: ConnectionOptions,
	) -> Result<ConnectionScope, ManagerError> {
		self.start(broker_url, options)?;
		Ok(ConnectionScope {
			manager: self.clone(),
		})
	}

	pub(crate) fn attach(&self, observer: Weak<dyn ConnectionObserver>) {
		self.shared.observers.lock().push(observer);
	}

	/// Runs `f` with the dispatch lock held, so no event is handled
	/// meanwhile. Reentrant.
	pub(crate) fn with_dispatch<R>(&self, f: impl FnOnce() -> R) -> R {
		let _dispatch = self.shared.dispatch.lock();
		f()
	}
}

impl fmt::Debug for ConnectionManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionManager")
			.field("state", &self.status())
			.field("broker_url", &self.broker_url())
			.finish()
	}
}

/// Stops its [`ConnectionManager`] when dropped.
#[must_use = "dropping the scope stops the connection"]
#[derive(Debug)]
pub struct ConnectionScope {
	manager: ConnectionManager,
}

impl ConnectionScope {
	/// The managed connection.
	pub fn manager(&self) -> &ConnectionManager {
		&self.manager
	}
}

impl Deref for ConnectionScope {
	type Target = ConnectionManager;

	fn deref(&self) -> &Self::Target {
		&self.manager
	}
}

impl Drop for ConnectionScope {
	fn drop(&mut self) {
		self.manager.stop();
	}
}
