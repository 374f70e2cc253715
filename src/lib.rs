//! # Backend-agnostic MQTT Client Manager
//!
//! `mqtt-switchboard` puts one stable, synchronous API in front of any number
//! of interchangeable MQTT implementations. Application code talks to a
//! [`ClientManager`]; the manager forwards each request to whichever
//! [`MqttBackend`] is active, and the backend can be switched at runtime.
//!
//! ## Core Features
//!
//! - **`no_std` + `alloc`:** Runs on bare-metal targets. Names, topics and the
//!   configuration use bounded `heapless` storage; the heap only holds backend
//!   trait objects and callbacks.
//! - **Pluggable backends:** Any type implementing [`MqttBackend`] can be
//!   registered under a name. Required operations are checked through
//!   [`Capabilities`] at registration and activation.
//! - **Built-in backend:** [`PubSubBackend`](pubsub::PubSubBackend) speaks
//!   MQTT 3.1.1 over any blocking [`Transport`](transport::Transport).
//! - **Closed error taxonomy:** every operation returns [`Result`], backend
//!   failures are translated into [`ErrorKind`], and a human-readable message
//!   is kept for [`ClientManager::get_last_error`].
//!
//! ## Logging
//!
//! Enable one of the `log`, `defmt` or `esp32-log` features to get the crate's
//! diagnostics; without them logging compiles away.
//!
//! ## Usage
//!
//! ```ignore
//! use mqtt_switchboard::{BackendRegistry, BackendType, ClientManager, QoS, create_default_config};
//! use mqtt_switchboard::pubsub::{BACKEND_NAME, PubSubBackend};
//!
//! let mut registry: BackendRegistry = BackendRegistry::new();
//! registry.register(BACKEND_NAME, Box::new(PubSubBackend::<_, 512>::new(transport)))?;
//!
//! let mut manager = ClientManager::new(registry);
//! manager.init(BackendType::PubSub)?;
//! manager.configure(&create_default_config("broker.local", 1883, "sensor-7"))?;
//! manager.connect()?;
//! manager.publish("sensors/7/temp", b"21.5", QoS::AtMostOnce, false)?;
//! manager.disconnect()?;
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

#[macro_use]
mod fmt;

pub mod backend;
pub mod config;
pub mod error;
pub mod manager;
pub mod message;
pub mod packet;
pub mod pubsub;
pub mod shared;
pub mod transport;
pub mod util;

// Re-export key types for easier access at the crate root.
pub use backend::{
    BackendDescriptor, BackendError, BackendRegistry, BackendResult, Capabilities,
    ConnectionEvent, MessageSink, MqttBackend,
};
pub use config::{ClientConfig, LastWill, create_default_config, validate_config};
pub use error::{ErrorKind, Result};
pub use manager::{BackendType, ClientManager};
pub use message::Message;
pub use packet::QoS;
