//! [`BrokerSession`] backed by `rumqttc`

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use arcstr::ArcStr;
use parking_lot::Mutex;
use rumqttc::Packet::{ConnAck, Disconnect, Publish, SubAck};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, SubscribeFilter};
use rumqttc::{ConnectReturnCode, SubscribeReasonCode};
use rumqttc::{Event::Incoming, Event::Outgoing};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use super::{
	AckToken, BrokerSession, SessionConnector, SessionError, SessionEvent,
	SessionEventSink, SubscribeOutcome, SubscribeRequest,
};
use crate::connection::{ConnectionError, ConnectionOptions, ReconnectSettings};
use crate::message::Message;
use crate::routing::SubscribeRejected;

/// Opens sessions with `rumqttc` on a tokio runtime.
///
/// Each session gets its own event loop task. Broker URLs use the
/// `rumqttc` URL form (`mqtt://host:port`, `mqtts://`, `ws://`, ...).
#[derive(Debug, Clone, Default)]
pub struct RumqttConnector {
	runtime: Option<Handle>,
}

impl RumqttConnector {
	/// Spawns event loops on the runtime current at `open` time.
	pub fn new() -> Self {
		Self::default()
	}

	/// Spawns event loops on `runtime`.
	pub fn with_runtime(runtime: Handle) -> Self {
		Self {
			runtime: Some(runtime),
		}
	}
}

impl SessionConnector for RumqttConnector {
	fn open(
		&self,
		broker_url: &str,
		options: &ConnectionOptions,
		events: SessionEventSink,
	) -> Result<Arc<dyn BrokerSession>, ConnectionError> {
		let runtime = self
			.runtime
			.clone()
			.or_else(|| Handle::try_current().ok())
			.ok_or_else(|| {
				ConnectionError::unavailable("no tokio runtime available")
			})?;

		let mqtt_options = mqtt_options(broker_url, options)?;
		let (client, event_loop) = AsyncClient::new(
			mqtt_options,
			options.request_channel_capacity.max(1),
		);

		let pending = Arc::new(Mutex::new(PendingAcks::default()));
		let driver = runtime.spawn(drive(
			event_loop,
			events,
			pending.clone(),
			options.reconnect.clone(),
		));
		info!(broker_url = %broker_url, "MQTT session opened");

		Ok(Arc::new(RumqttSession {
			client,
			pending,
			driver,
		}))
	}
}

/// Builds `rumqttc` options from a broker URL and [`ConnectionOptions`].
///
/// A `client_id` already present in the URL query wins over
/// `options.client_id`; without either, one is generated.
pub fn mqtt_options(
	broker_url: &str,
	options: &ConnectionOptions,
) -> Result<MqttOptions, ConnectionError> {
	let url = if broker_url.contains("client_id=") {
		broker_url.to_string()
	} else {
		let client_id = options.client_id.clone().unwrap_or_else(|| {
			let uuid = uuid::Uuid::new_v4().to_string();
			format!("mqtt_session_{}", &uuid[.. 8])
		});
		let separator = if broker_url.contains('?') { '&' } else { '?' };
		format!("{broker_url}{separator}client_id={client_id}")
	};

	let mut mqtt_options =
		MqttOptions::parse_url(url).map_err(ConnectionError::invalid_options)?;
	mqtt_options.set_keep_alive(options.keep_alive());
	mqtt_options.set_clean_session(options.clean_session);
	if let Some(credentials) = &options.credentials {
		mqtt_options.set_credentials(
			credentials.username.clone(),
			credentials.password.clone(),
		);
	}
	Ok(mqtt_options)
}

struct RumqttSession {
	client: AsyncClient,
	pending: Arc<Mutex<PendingAcks>>,
	driver: JoinHandle<()>,
}

impl BrokerSession for RumqttSession {
	fn subscribe(&self, request: SubscribeRequest) -> Result<(), SessionError> {
		if self.driver.is_finished() {
			return Err(SessionError::Closed);
		}
		let filters = request
			.filters
			.iter()
			.map(|(filter, qos)| SubscribeFilter::new(filter.to_string(), *qos))
			.collect::<Vec<_>>();

		// Queue order must follow request order, hold the lock across both
		let mut pending = self.pending.lock();
		self.client.try_subscribe_many(filters)?;
		pending.queue(request.token);
		Ok(())
	}

	fn unsubscribe(&self, filters: Vec<ArcStr>) -> Result<(), SessionError> {
		if self.driver.is_finished() {
			return Err(SessionError::Closed);
		}
		for filter in filters {
			self.client.try_unsubscribe(filter.as_str())?;
		}
		Ok(())
	}

	fn end(&self, force: bool) {
		if force {
			self.driver.abort();
			return;
		}
		if let Err(err) = self.client.try_disconnect() {
			warn!(error = %err, "Failed to queue MQTT disconnect");
			self.driver.abort();
		}
	}
}

impl Drop for RumqttSession {
	fn drop(&mut self) {
		if !self.driver.is_finished() {
			debug!("MQTT session dropped while running, aborting event loop");
			self.driver.abort();
		}
	}
}

/// Maps SUBSCRIBE packet ids back to the tokens of the requests.
///
/// `rumqttc` assigns packet ids when it sends the request, in queue order.
#[derive(Debug, Default)]
struct PendingAcks {
	unassigned: VecDeque<AckToken>,
	in_flight: HashMap<u16, AckToken>,
}

impl PendingAcks {
	fn queue(&mut self, token: AckToken) {
		self.unassigned.push_back(token);
	}

	fn assign(&mut self, pkid: u16) {
		match self.unassigned.pop_front() {
			| Some(token) => {
				self.in_flight.insert(pkid, token);
			}
			| None => {
				warn!(pkid = pkid, "Outgoing SUBSCRIBE without a pending request")
			}
		}
	}

	fn complete(&mut self, pkid: u16) -> Option<AckToken> {
		self.in_flight.remove(&pkid)
	}

	// Acks for packets sent on a dropped connection never arrive
	fn connection_lost(&mut self) {
		self.in_flight.clear();
	}
}

fn subscribe_outcome(return_codes: &[SubscribeReasonCode]) -> SubscribeOutcome {
	let granted = return_codes
		.iter()
		.filter_map(|code| match code {
			| SubscribeReasonCode::Success(qos) => Some(*qos),
			| SubscribeReasonCode::Failure => None,
		})
		.collect::<Vec<_>>();

	if granted.len() == return_codes.len() {
		SubscribeOutcome::Granted(granted)
	} else {
		SubscribeOutcome::Rejected(SubscribeRejected::new(format!(
			"broker refused {} of {} filters",
			return_codes.len() - granted.len(),
			return_codes.len()
		)))
	}
}

/// Polls the event loop and reports to `sink` until the session ends.
///
/// The loop stops on a Disconnect packet (either direction), when the error
/// limit is reached, or once the manager is gone.
async fn drive(
	mut event_loop: EventLoop,
	sink: SessionEventSink,
	pending: Arc<Mutex<PendingAcks>>,
	reconnect: ReconnectSettings,
) {
	let mut error_count = 0;

	while sink.is_attached() {
		match event_loop.poll().await {
			| Ok(Incoming(ConnAck(ack))) => {
				error_count = 0;
				if ack.code == ConnectReturnCode::Success {
					info!(
						session_present = ack.session_present,
						"Connected to MQTT broker"
					);
					sink.emit(SessionEvent::Connect {
						session_present: ack.session_present,
					});
				} else {
					warn!(code = ?ack.code, "MQTT broker refused connection");
					sink.emit(SessionEvent::Error(ConnectionError::rejected(
						format!("{:?}", ack.code),
					)));
				}
			}
			| Ok(Incoming(Publish(p))) => {
				error_count = 0;
				debug!(topic = %p.topic, payload_size = p.payload.len(), "Received MQTT message");
				sink.emit(SessionEvent::Message(Message::new(
					p.topic, p.payload,
				)));
			}
			| Ok(Incoming(SubAck(ack))) => {
				error_count = 0;
				let token = pending.lock().complete(ack.pkid);
				match token {
					| Some(token) => sink.emit(SessionEvent::SubscribeAck {
						token,
						outcome: subscribe_outcome(&ack.return_codes),
					}),
					| None => {
						debug!(pkid = ack.pkid, "SUBACK for unknown request")
					}
				}
			}
			| Ok(Outgoing(rumqttc::Outgoing::Subscribe(pkid))) => {
				pending.lock().assign(pkid);
			}
			| Ok(Incoming(Disconnect)) => {
				info!("Received MQTT Disconnect packet from server");
				break;
			}
			| Ok(Outgoing(rumqttc::Outgoing::Disconnect)) => {
				info!("Sent MQTT Disconnect packet to server");
				break;
			}
			| Ok(notification) => {
				debug!(notification = ?notification, "Received MQTT notification");
			}
			| Err(err) => {
				error_count += 1;
				error!(error_count = error_count, error = %err, "MQTT event loop error");
				pending.lock().connection_lost();
				sink.emit(SessionEvent::Error(ConnectionError::transport(&err)));
				sink.emit(SessionEvent::Offline);

				if reconnect.exhausted(error_count) {
					error!(
						error_count = error_count,
						max_errors = reconnect.max_consecutive_errors,
						"Too many consecutive errors, terminating event loop"
					);
					break;
				}

				let delay = reconnect.delay_for(error_count);
				warn!(delay = ?delay, error_count = error_count, "Retrying MQTT connection");
				time::sleep(delay).await;
				sink.emit(SessionEvent::Reconnect);
			}
		}
	}

	info!("MQTT event loop terminated");
	sink.emit(SessionEvent::End);
}
