//! Connection monitor
//!
//! Connects to `MQTT_BROKER` (default `mqtt://localhost:1883`), subscribes
//! to the filters given as arguments (default `#`) and logs every state
//! change and message until Ctrl-C.
//!
//! ```bash
//! RUST_LOG=info mqtt-session-monitor 'sensors/+/temp' 'alerts/#'
//! ```

use std::env;

use mqtt_session::{
	ConnectionManager, ConnectionOptions, RumqttConnector, SubscribeOptions,
	SubscriptionRegistry,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BROKER: &str = "mqtt://localhost:1883";

/// Installs the fmt subscriber, filtered by `RUST_LOG` (default `info`).
///
/// `RUST_LOG_DISABLE` turns logging off entirely.
fn setup_tracing() {
	if env::var("RUST_LOG_DISABLE").is_ok() {
		return;
	}
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| "info".into());

	tracing_subscriber::registry()
		.with(filter)
		.with(
			tracing_subscriber::fmt::layer()
				.with_target(true)
				.with_thread_ids(false)
				.with_file(false)
				.with_line_number(false)
				.compact(),
		)
		.init();
}

fn broker_url() -> String {
	env::var("MQTT_BROKER").unwrap_or_else(|_| DEFAULT_BROKER.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	// .env may provide RUST_LOG and MQTT_BROKER
	dotenv::dotenv().ok();
	setup_tracing();

	let mut filters: Vec<String> = env::args().skip(1).collect();
	if filters.is_empty() {
		filters.push("#".to_string());
	}

	let manager = ConnectionManager::new(RumqttConnector::new());
	let registry = SubscriptionRegistry::new(&manager);

	manager
		.on_state_change(|state| info!(state = %state, "Connection state"))
		.detach();

	let subscription =
		registry.subscribe(filters.clone(), SubscribeOptions::default())?;
	subscription.on_message(|message| {
		info!(
			topic = %message.topic(),
			payload = %message.payload_str(),
			"Message"
		);
	})?;
	subscription.on_subscribe_result(|result| match result {
		| Ok(()) => info!("Subscription granted"),
		| Err(rejected) => warn!(reason = rejected.reason(), "Subscription rejected"),
	})?;

	let url = broker_url();
	info!(broker_url = %url, filters = ?filters, "Starting monitor");
	let connection = manager.scoped(url, ConnectionOptions::default())?;

	if let Err(err) = tokio::signal::ctrl_c().await {
		error!(error = %err, "Failed to wait for Ctrl-C");
	}
	info!("Shutting down");
	subscription.unsubscribe();
	drop(connection);
	Ok(())
}
