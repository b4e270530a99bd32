//! Connection lifecycle management
//!
//! [`ConnectionManager`] opens one broker session through a
//! [`SessionConnector`](crate::session::SessionConnector), turns the events
//! it reports into [`ConnectionState`] transitions and publishes them.

pub mod error;
pub(crate) mod listeners;
pub(crate) mod manager;
pub mod options;
pub mod state;

pub use error::{ConnectionError, ManagerError};
pub use listeners::StateListenerHandle;
pub use manager::{ConnectionManager, ConnectionScope, ConnectionSnapshot};
pub use options::{
	ConnectionOptions, Credentials, ReconnectSettings, ResubscribePolicy,
};
pub use state::ConnectionState;
