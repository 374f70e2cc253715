//! Backend layer.
//!
//! # Overview
//!
//! - [`MqttBackend`] is the contract a transport implementation fulfils.
//! - [`BackendRegistry`] owns a bounded set of named backends.
//! - [`CallbackBridge`] carries inbound messages from the active backend to the
//!   application, and [`translate`] maps backend failures into
//!   [`ErrorKind`](crate::ErrorKind).
//!
//! # Example
//!
//! ```ignore
//! let mut registry: BackendRegistry = BackendRegistry::new();
//! registry.register("pubsub", Box::new(PubSubBackend::<_, 512>::new(transport)))?;
//! registry.register("vendor", Box::new(VendorBackend::new()))?;
//!
//! let mut manager = ClientManager::new(registry);
//! manager.init(BackendType::PubSub)?;
//! ```

pub(crate) mod bridge;
pub(crate) mod registry;
pub(crate) mod traits;

pub use bridge::{
    CallbackBridge, ConnectionCallback, ConnectionEvent, MessageCallback, MessageSink, Operation,
    translate,
};
pub use registry::{
    BackendDescriptor, BackendRegistry, MAX_BACKEND_NAME_LEN, MAX_BACKENDS, RegisterError,
};
pub use traits::{BackendError, BackendResult, Capabilities, MqttBackend};
