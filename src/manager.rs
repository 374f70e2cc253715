//! # Client Manager
//!
//! [`ClientManager`] is the one object the application talks to. It owns the
//! [`BackendRegistry`], tracks which backend is active, and walks the
//! connection state machine:
//!
//! ```text
//! Uninitialized --init--> Initialized --configure--> Configured --connect--> Connected
//!                                          ^   |  reconfigure                  |
//!                                          |   +--------------<--------disconnect
//!                                cleanup() from anywhere returns to Uninitialized
//! ```
//!
//! Every public operation returns [`Result`](crate::Result) and overwrites the
//! human-readable message read by [`get_last_error`](ClientManager::get_last_error),
//! on success as well as on failure. Read it right after the call you care
//! about.
//!
//! The manager performs no locking and is `Send` but not `Sync`. Wrap it in a
//! [`SharedClientManager`](crate::shared::SharedClientManager) to share it
//! between execution contexts.
//!
//! # Example
//!
//! ```ignore
//! let mut registry: BackendRegistry = BackendRegistry::new();
//! registry.register(BACKEND_NAME, Box::new(PubSubBackend::<_, 512>::new(TcpTransport::new())))?;
//!
//! let mut manager = ClientManager::new(registry);
//! manager.init(BackendType::PubSub)?;
//! manager.configure(&create_default_config("broker.local", 1883, "sensor-7"))?;
//! manager.set_message_callback(|topic, payload| handle(topic, payload))?;
//! manager.connect()?;
//! manager.subscribe("sensors/+/cmd", QoS::AtLeastOnce)?;
//!
//! loop {
//!     manager.run_loop(Duration::from_millis(100))?;
//! }
//! ```

use alloc::boxed::Box;
use core::cell::Cell;
use core::marker::PhantomData;

use embassy_time::Duration;
use heapless::{String, Vec};

use crate::backend::{
    BackendDescriptor, BackendRegistry, BackendResult, CallbackBridge, Capabilities,
    ConnectionCallback, ConnectionEvent, MAX_BACKENDS, MqttBackend, Operation, translate,
};
use crate::config::{ClientConfig, LastWill, validate_config};
use crate::error::{ErrorKind, Result};
use crate::message::{Message, validate_topic};
use crate::packet::QoS;
use crate::pubsub::BACKEND_NAME as PUBSUB_BACKEND_NAME;
use crate::util::truncated;

/// Capacity of the last-error message.
pub const MAX_ERROR_LEN: usize = 256;

const NO_BACKEND: &str = "No backend available";
const NOT_INITIALIZED: &str = "Manager not initialized";
const NOT_CONFIGURED: &str = "Client not configured";
const NOT_CONNECTED: &str = "Not connected to broker";

/// Which backend [`ClientManager::init`] should activate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType<'a> {
    /// The built-in backend registered as `"pubsub"`.
    PubSub,
    /// A backend registered under the given name.
    Custom(&'a str),
}

impl BackendType<'_> {
    pub fn name(&self) -> &str {
        match self {
            BackendType::PubSub => PUBSUB_BACKEND_NAME,
            BackendType::Custom(name) => name,
        }
    }
}

/// Backend-agnostic MQTT client manager.
///
/// `N` is the registry capacity.
pub struct ClientManager<const N: usize = MAX_BACKENDS> {
    registry: BackendRegistry<N>,
    current: Option<usize>,
    config: Option<ClientConfig>,
    initialized: bool,
    configured: bool,
    bridge: CallbackBridge,
    connection_callback: Option<ConnectionCallback>,
    last_error: String<MAX_ERROR_LEN>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<const N: usize> Default for ClientManager<N> {
    fn default() -> Self {
        Self::new(BackendRegistry::new())
    }
}

impl<const N: usize> Drop for ClientManager<N> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl<const N: usize> ClientManager<N> {
    /// Creates an uninitialized manager over a pre-filled registry.
    pub fn new(registry: BackendRegistry<N>) -> Self {
        Self {
            registry,
            current: None,
            config: None,
            initialized: false,
            configured: false,
            bridge: CallbackBridge::new(),
            connection_callback: None,
            last_error: String::new(),
            _not_sync: PhantomData,
        }
    }

    fn note(&mut self, message: &str) {
        self.last_error = truncated(message);
    }

    fn fail<T>(&mut self, kind: ErrorKind, message: &str) -> Result<T> {
        debug!("{}: {}", kind.as_str(), message);
        self.note(message);
        Err(kind)
    }

    fn emit(&mut self, event: ConnectionEvent) {
        if let Some(callback) = self.connection_callback.as_mut() {
            callback(event);
        }
    }

    fn active(&self) -> Option<&BackendDescriptor> {
        self.current.and_then(|index| self.registry.get(index))
    }

    fn active_has(&self, capability: Capabilities) -> bool {
        self.active().is_some_and(|d| d.has(capability))
    }

    /// Runs `f` against the active backend, translating a failure and
    /// forwarding the backend's own message (or `fallback`) to the last error.
    fn delegate<F>(&mut self, op: Operation, fallback: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn MqttBackend, &mut CallbackBridge) -> BackendResult,
    {
        let Some(index) = self.current else {
            return self.fail(ErrorKind::BackendNotFound, NO_BACKEND);
        };
        let Some(descriptor) = self.registry.get_mut(index) else {
            return self.fail(ErrorKind::BackendNotFound, NO_BACKEND);
        };

        match f(descriptor.backend_mut(), &mut self.bridge) {
            Ok(()) => Ok(()),
            Err(err) => {
                let kind = translate(op, err);
                let detail = descriptor.backend().last_error();
                let message = if detail.is_empty() { fallback } else { detail };
                warn!("{} backend failed: {}", descriptor.name(), message);
                self.last_error = truncated(message);
                Err(kind)
            }
        }
    }

    /// Tells the active backend whether a message callback is installed.
    fn announce_callback(&mut self) -> Result<()> {
        if !self.active_has(Capabilities::CALLBACK) {
            return Ok(());
        }
        let installed = self.bridge.is_installed();
        self.delegate(Operation::Callback, "Callback setup failed", |backend, _| {
            backend.set_callback(installed)
        })
    }

    /// Disconnects and releases the active backend, if any.
    fn release_active(&mut self) {
        let Some(descriptor) = self.current.and_then(|index| self.registry.get_mut(index)) else {
            return;
        };
        let backend = descriptor.backend_mut();
        let was_connected = backend.is_connected();
        if was_connected && backend.disconnect().is_err() {
            warn!("disconnect during teardown failed");
        }
        backend.cleanup();
        if was_connected {
            self.emit(ConnectionEvent::Disconnected);
        }
    }

    /// Activates a backend. Idempotent: a second call succeeds and changes
    /// nothing.
    ///
    /// The hinted backend is preferred; when it is not registered the first
    /// registered backend is used instead.
    pub fn init(&mut self, backend_type: BackendType<'_>) -> Result<()> {
        if self.initialized {
            self.note("Already initialized");
            return Ok(());
        }

        let index = match self.registry.position(backend_type.name()) {
            Some(index) => index,
            None if !self.registry.is_empty() => {
                warn!(
                    "backend {} not registered, falling back to the first one",
                    backend_type.name()
                );
                0
            }
            None => return self.fail(ErrorKind::BackendNotFound, NO_BACKEND),
        };

        self.current = Some(index);
        self.initialized = true;
        if let Err(kind) = self.announce_callback() {
            warn!("backend rejected callback setup: {}", kind.as_str());
        }

        if let Some(descriptor) = self.active() {
            info!("client manager initialized with backend {}", descriptor.name());
        }
        self.note("Client manager initialized");
        Ok(())
    }

    /// Tears down the connection and the active backend and returns to the
    /// uninitialized state. Registered backends stay in the registry;
    /// callbacks are dropped.
    pub fn cleanup(&mut self) {
        if !self.initialized && self.current.is_none() {
            return;
        }
        self.release_active();
        self.current = None;
        self.config = None;
        self.initialized = false;
        self.configured = false;
        self.bridge.clear();
        self.connection_callback = None;
        self.note("Client manager cleaned up");
        info!("client manager cleaned up");
    }

    /// Adds a backend to the registry. Requires [`init`](Self::init).
    pub fn register_backend(&mut self, name: &str, backend: Box<dyn MqttBackend>) -> Result<()> {
        if !self.initialized {
            return self.fail(ErrorKind::InvalidParam, NOT_INITIALIZED);
        }
        match self.registry.register(name, backend) {
            Ok(()) => {
                info!("registered backend {}", name);
                self.note("Backend registered successfully");
                Ok(())
            }
            Err(err) => self.fail(err.into(), err.as_str()),
        }
    }

    pub fn find_backend(&self, name: &str) -> Option<&BackendDescriptor> {
        self.registry.find(name)
    }

    /// At most `max` registered backends, in registration order.
    pub fn list_backends(&self, max: usize) -> Vec<&BackendDescriptor, N> {
        self.registry.list(max)
    }

    pub fn registry(&self) -> &BackendRegistry<N> {
        &self.registry
    }

    /// Switches to the backend registered as `name`.
    ///
    /// An active connection is closed and the old backend cleaned up first,
    /// also when `name` is already active. The new backend starts
    /// unconfigured. A backend refusing the callback announcement is logged
    /// and does not fail the switch.
    pub fn set_backend(&mut self, name: &str) -> Result<()> {
        if !self.initialized {
            return self.fail(ErrorKind::InvalidParam, NOT_INITIALIZED);
        }
        let Some(index) = self.registry.position(name) else {
            return self.fail(ErrorKind::BackendNotFound, "Backend not found");
        };
        let complete = self
            .registry
            .get(index)
            .is_some_and(|d| d.capabilities().is_complete());
        if !complete {
            return self.fail(ErrorKind::InvalidParam, "Incomplete backend operations");
        }

        self.release_active();
        self.current = Some(index);
        self.config = None;
        self.configured = false;
        if let Err(kind) = self.announce_callback() {
            warn!("backend {} rejected callback setup: {}", name, kind.as_str());
        }

        info!("switched to backend {}", name);
        self.note("Backend switched successfully");
        Ok(())
    }

    pub fn get_backend(&self) -> Option<&BackendDescriptor> {
        self.active()
    }

    /// Validates `config` and hands it to the active backend.
    ///
    /// Calling it again reconfigures; a failed reconfigure leaves the client
    /// unconfigured.
    pub fn configure(&mut self, config: &ClientConfig) -> Result<()> {
        if self.current.is_none() {
            return self.fail(ErrorKind::BackendNotFound, NO_BACKEND);
        }
        if let Err(err) = validate_config(config) {
            return self.fail(err.into(), err.as_str());
        }

        if let Err(kind) = self.delegate(
            Operation::Init,
            "Backend initialization failed",
            |backend, _| backend.init(config),
        ) {
            self.configured = false;
            self.config = None;
            return Err(kind);
        }

        self.config = Some(config.clone());
        self.configured = true;
        debug!("configured for {}:{}", config.host.as_str(), config.port);
        self.note("MQTT client configured successfully");
        Ok(())
    }

    pub fn connect(&mut self) -> Result<()> {
        if self.current.is_none() {
            return self.fail(ErrorKind::BackendNotFound, NO_BACKEND);
        }
        if !self.configured {
            return self.fail(ErrorKind::NotConnected, NOT_CONFIGURED);
        }
        if self.is_connected() {
            return self.fail(ErrorKind::AlreadyConnected, "Already connected");
        }

        match self.delegate(Operation::Connect, "Connection failed", |backend, _| {
            backend.connect()
        }) {
            Ok(()) => {
                info!("connected to broker");
                self.note("Connected successfully");
                self.emit(ConnectionEvent::Connected);
                Ok(())
            }
            Err(kind) => {
                self.emit(ConnectionEvent::ConnectFailed(kind));
                Err(kind)
            }
        }
    }

    /// Closes the connection. Succeeds when already disconnected, and also
    /// when the backend reports a failure: the link is considered gone either
    /// way and the backend's message is kept in the last error.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.current.is_none() {
            return self.fail(ErrorKind::BackendNotFound, NO_BACKEND);
        }
        if !self.is_connected() {
            self.note("Already disconnected");
            return Ok(());
        }

        match self.delegate(Operation::Disconnect, "Disconnect failed", |backend, _| {
            backend.disconnect()
        }) {
            Ok(()) => self.note("Disconnected successfully"),
            Err(kind) => warn!("backend disconnect failed: {}", kind.as_str()),
        }
        self.emit(ConnectionEvent::Disconnected);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.active().is_some_and(|d| d.backend().is_connected())
    }

    /// Uses the backend's own reconnect when it has one, disconnect plus
    /// connect otherwise.
    pub fn reconnect(&mut self) -> Result<()> {
        if self.current.is_none() {
            return self.fail(ErrorKind::BackendNotFound, NO_BACKEND);
        }
        if !self.configured {
            return self.fail(ErrorKind::NotConnected, NOT_CONFIGURED);
        }

        if !self.active_has(Capabilities::RECONNECT) {
            self.disconnect()?;
            self.connect()?;
            info!("reconnected to broker");
            self.note("Reconnected successfully");
            return Ok(());
        }

        match self.delegate(Operation::Reconnect, "Reconnect failed", |backend, _| {
            backend.reconnect()
        }) {
            Ok(()) => {
                info!("reconnected to broker");
                self.note("Reconnected successfully");
                self.emit(ConnectionEvent::Connected);
                Ok(())
            }
            Err(kind) => {
                self.emit(ConnectionEvent::ConnectFailed(kind));
                Err(kind)
            }
        }
    }

    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retained: bool) -> Result<()> {
        self.publish_message(&Message::new(topic, payload, qos, retained))
    }

    pub fn publish_message(&mut self, message: &Message<'_>) -> Result<()> {
        self.ready_for(message.topic)?;
        self.delegate(Operation::Publish, "Publish failed", |backend, _| {
            backend.publish(message)
        })?;
        trace!("published {} bytes to {}", message.payload.len(), message.topic);
        self.note("Message published");
        Ok(())
    }

    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<()> {
        self.ready_for(topic)?;
        self.delegate(Operation::Subscribe, "Subscribe failed", |backend, _| {
            backend.subscribe(topic, qos)
        })?;
        debug!("subscribed to {}", topic);
        self.note("Subscribed successfully");
        Ok(())
    }

    pub fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        self.ready_for(topic)?;
        self.delegate(Operation::Unsubscribe, "Unsubscribe failed", |backend, _| {
            backend.unsubscribe(topic)
        })?;
        debug!("unsubscribed from {}", topic);
        self.note("Unsubscribed successfully");
        Ok(())
    }

    /// Common preconditions of publish/subscribe/unsubscribe. A request that
    /// fails here never reaches the backend.
    fn ready_for(&mut self, topic: &str) -> Result<()> {
        if self.current.is_none() {
            return self.fail(ErrorKind::BackendNotFound, NO_BACKEND);
        }
        if let Err(err) = validate_topic(topic) {
            return self.fail(ErrorKind::InvalidParam, err.as_str());
        }
        if !self.is_connected() {
            return self.fail(ErrorKind::NotConnected, NOT_CONNECTED);
        }
        Ok(())
    }

    /// Lets the backend process network events for at most `timeout`.
    /// Inbound messages reach the message callback before this returns.
    pub fn run_loop(&mut self, timeout: Duration) -> Result<()> {
        if self.current.is_none() {
            return self.fail(ErrorKind::BackendNotFound, NO_BACKEND);
        }
        if self.active_has(Capabilities::LOOP) {
            self.delegate(Operation::Loop, "Loop failed", |backend, bridge| {
                backend.run_loop(timeout, bridge)
            })?;
        }
        self.note("Loop completed");
        Ok(())
    }

    /// Non-blocking event processing, falling back to [`run_loop`](Self::run_loop)
    /// for backends without a separate yield.
    pub fn yield_now(&mut self, timeout: Duration) -> Result<()> {
        if self.current.is_none() {
            return self.fail(ErrorKind::BackendNotFound, NO_BACKEND);
        }
        if self.active_has(Capabilities::YIELD) {
            self.delegate(Operation::Loop, "Yield failed", |backend, bridge| {
                backend.yield_now(timeout, bridge)
            })?;
        } else if self.active_has(Capabilities::LOOP) {
            self.delegate(Operation::Loop, "Loop failed", |backend, bridge| {
                backend.run_loop(timeout, bridge)
            })?;
        }
        self.note("Yield completed");
        Ok(())
    }

    /// Sets the will the backend announces on its next connect.
    pub fn set_will(&mut self, will: &LastWill) -> Result<()> {
        if self.current.is_none() {
            return self.fail(ErrorKind::BackendNotFound, NO_BACKEND);
        }
        if will.topic.is_empty() {
            return self.fail(ErrorKind::InvalidParam, "Last will topic is empty");
        }
        if !self.active_has(Capabilities::WILL) {
            return self.fail(ErrorKind::InvalidParam, "Backend does not support last will");
        }
        self.delegate(Operation::Will, "Set will failed", |backend, _| {
            backend.set_will(will)
        })?;
        self.note("Last will set");
        Ok(())
    }

    pub fn clear_will(&mut self) -> Result<()> {
        if self.current.is_none() {
            return self.fail(ErrorKind::BackendNotFound, NO_BACKEND);
        }
        if !self.active_has(Capabilities::WILL) {
            return self.fail(ErrorKind::InvalidParam, "Backend does not support last will");
        }
        self.delegate(Operation::Will, "Clear will failed", |backend, _| {
            backend.clear_will()
        })?;
        self.note("Last will cleared");
        Ok(())
    }

    /// Installs the application message callback, replacing any previous one.
    ///
    /// The callback runs synchronously inside [`run_loop`](Self::run_loop) and
    /// [`yield_now`](Self::yield_now) and must not block.
    pub fn set_message_callback<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(&str, &[u8]) + Send + 'static,
    {
        self.bridge.install(Box::new(callback));
        self.announce_callback()?;
        self.note("Message callback set");
        Ok(())
    }

    pub fn clear_message_callback(&mut self) -> Result<()> {
        self.bridge.clear();
        self.announce_callback()?;
        self.note("Message callback cleared");
        Ok(())
    }

    /// Installs a callback fired on connect, connect failure and disconnect.
    pub fn set_connection_callback<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(ConnectionEvent) + Send + 'static,
    {
        self.connection_callback = Some(Box::new(callback));
        self.note("Connection callback set");
        Ok(())
    }

    /// Message left by the most recent operation.
    pub fn get_last_error(&self) -> &str {
        self.last_error.as_str()
    }

    pub fn get_connection_status_string(&self) -> &'static str {
        if !self.initialized {
            "Not initialized"
        } else if self.current.is_none() {
            "No backend"
        } else if !self.configured {
            "Not configured"
        } else if self.is_connected() {
            "Connected"
        } else {
            "Disconnected"
        }
    }

    /// Backend-specific status code of the active backend.
    pub fn connection_status(&self) -> Option<i32> {
        self.active().map(|d| d.backend().connection_status())
    }

    pub fn config(&self) -> Option<&ClientConfig> {
        self.config.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }
}
