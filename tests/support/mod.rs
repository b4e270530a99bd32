//! Scriptable broker session for integration tests
#![allow(dead_code)]

use std::sync::Arc;

use arcstr::ArcStr;
use mqtt_session::session::{
	AckToken, BrokerSession, SessionConnector, SessionError, SessionEvent,
	SessionEventSink, SubscribeOutcome, SubscribeRequest,
};
use mqtt_session::{
	ConnectionError, ConnectionManager, ConnectionOptions, ConnectionState,
	Message, QoS, StateListenerHandle, SubscribeRejected, Subscription,
};
use parking_lot::Mutex;

pub const BROKER_URL: &str = "mqtt://broker.test:1883";

#[derive(Default)]
struct ConnectorState {
	sessions: Mutex<Vec<Arc<MockSession>>>,
	fail_next: Mutex<Option<ConnectionError>>,
}

/// Connector that hands out [`MockSession`]s and remembers them.
#[derive(Clone, Default)]
pub struct MockConnector {
	state: Arc<ConnectorState>,
}

impl MockConnector {
	pub fn new() -> Self {
		Self::default()
	}

	/// The next `open` fails with `err`.
	pub fn fail_next(&self, err: ConnectionError) {
		*self.state.fail_next.lock() = Some(err);
	}

	pub fn open_count(&self) -> usize {
		self.state.sessions.lock().len()
	}

	pub fn session(&self, index: usize) -> Arc<MockSession> {
		self.state.sessions.lock()[index].clone()
	}

	pub fn last(&self) -> Arc<MockSession> {
		self.state
			.sessions
			.lock()
			.last()
			.cloned()
			.expect("no session opened")
	}
}

impl SessionConnector for MockConnector {
	fn open(
		&self,
		broker_url: &str,
		options: &ConnectionOptions,
		events: SessionEventSink,
	) -> Result<Arc<dyn BrokerSession>, ConnectionError> {
		if let Some(err) = self.state.fail_next.lock().take() {
			return Err(err);
		}
		let session = Arc::new(MockSession {
			sink: events,
			url: broker_url.to_string(),
			options: options.clone(),
			subscribes: Mutex::new(Vec::new()),
			unsubscribes: Mutex::new(Vec::new()),
			ends: Mutex::new(Vec::new()),
			refuse_commands: Mutex::new(false),
		});
		self.state.sessions.lock().push(session.clone());
		Ok(session)
	}
}

/// Records commands and lets the test emit session events.
pub struct MockSession {
	sink: SessionEventSink,
	pub url: String,
	pub options: ConnectionOptions,
	subscribes: Mutex<Vec<SubscribeRequest>>,
	unsubscribes: Mutex<Vec<Vec<ArcStr>>>,
	ends: Mutex<Vec<bool>>,
	refuse_commands: Mutex<bool>,
}

impl MockSession {
	pub fn emit(&self, event: SessionEvent) {
		self.sink.emit(event);
	}

	pub fn connect(&self) {
		self.connect_with(false);
	}

	pub fn connect_with(&self, session_present: bool) {
		self.emit(SessionEvent::Connect { session_present });
	}

	pub fn reconnect(&self) {
		self.emit(SessionEvent::Reconnect);
	}

	pub fn offline(&self) {
		self.emit(SessionEvent::Offline);
	}

	pub fn error(&self, detail: &str) {
		self.emit(SessionEvent::Error(ConnectionError::transport(detail)));
	}

	pub fn end_session(&self) {
		self.emit(SessionEvent::End);
	}

	pub fn publish(&self, topic: &str, payload: &str) {
		self.emit(SessionEvent::Message(Message::new(
			topic,
			payload.to_string(),
		)));
	}

	pub fn grant(&self, token: AckToken) {
		self.emit(SessionEvent::SubscribeAck {
			token,
			outcome: SubscribeOutcome::Granted(vec![QoS::AtLeastOnce]),
		});
	}

	pub fn reject(&self, token: AckToken, reason: &str) {
		self.emit(SessionEvent::SubscribeAck {
			token,
			outcome: SubscribeOutcome::Rejected(SubscribeRejected::new(reason)),
		});
	}

	/// Grants every request recorded so far.
	pub fn grant_all(&self) {
		let tokens: Vec<AckToken> =
			self.subscribes().iter().map(|r| r.token).collect();
		for token in tokens {
			self.grant(token);
		}
	}

	/// Makes subscribe and unsubscribe fail from now on.
	pub fn refuse_commands(&self) {
		*self.refuse_commands.lock() = true;
	}

	pub fn subscribes(&self) -> Vec<SubscribeRequest> {
		self.subscribes.lock().clone()
	}

	pub fn subscribe_count(&self) -> usize {
		self.subscribes.lock().len()
	}

	pub fn last_subscribe(&self) -> SubscribeRequest {
		self.subscribes
			.lock()
			.last()
			.cloned()
			.expect("no subscribe request")
	}

	/// Filters of every subscribe request, in order.
	pub fn subscribed_filters(&self) -> Vec<Vec<String>> {
		self.subscribes
			.lock()
			.iter()
			.map(|r| r.filters.iter().map(|(f, _)| f.to_string()).collect())
			.collect()
	}

	pub fn unsubscribes(&self) -> Vec<Vec<String>> {
		self.unsubscribes
			.lock()
			.iter()
			.map(|filters| filters.iter().map(|f| f.to_string()).collect())
			.collect()
	}

	/// `force` flag of every `end` call.
	pub fn ends(&self) -> Vec<bool> {
		self.ends.lock().clone()
	}
}

impl BrokerSession for MockSession {
	fn subscribe(&self, request: SubscribeRequest) -> Result<(), SessionError> {
		if *self.refuse_commands.lock() {
			return Err(SessionError::Closed);
		}
		self.subscribes.lock().push(request);
		Ok(())
	}

	fn unsubscribe(&self, filters: Vec<ArcStr>) -> Result<(), SessionError> {
		if *self.refuse_commands.lock() {
			return Err(SessionError::Closed);
		}
		self.unsubscribes.lock().push(filters);
		Ok(())
	}

	fn end(&self, force: bool) {
		self.ends.lock().push(force);
	}
}

/// Records every state the manager publishes.
pub fn record_states(
	manager: &ConnectionManager,
) -> (StateListenerHandle, Arc<Mutex<Vec<ConnectionState>>>) {
	let states = Arc::new(Mutex::new(Vec::new()));
	let sink = states.clone();
	let handle = manager.on_state_change(move |state| {
		sink.lock().push(state.clone());
	});
	(handle, states)
}

/// Records `(topic, payload)` of every message delivered to `subscription`.
pub fn record_messages(
	subscription: &Subscription,
) -> Arc<Mutex<Vec<(String, String)>>> {
	let messages = Arc::new(Mutex::new(Vec::new()));
	let sink = messages.clone();
	subscription
		.on_message(move |message| {
			sink.lock().push((
				message.topic().to_string(),
				message.payload_str().into_owned(),
			));
		})
		.expect("subscription is live");
	messages
}

/// Manager with a started session that has connected once.
pub fn connected_manager()
-> (ConnectionManager, MockConnector, Arc<MockSession>) {
	let connector = MockConnector::new();
	let manager = ConnectionManager::new(connector.clone());
	manager
		.start(BROKER_URL, ConnectionOptions::default())
		.expect("manager is running");
	let session = connector.last();
	session.connect();
	(manager, connector, session)
}
