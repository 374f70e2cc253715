//! The backend contract.
//!
//! A backend is anything that can move MQTT traffic: the built-in
//! [`PubSubBackend`](crate::pubsub::PubSubBackend), a wrapper around a vendor
//! SDK, or a test double. The [`ClientManager`](crate::ClientManager) only
//! ever talks to backends through [`MqttBackend`].
//!
//! # Object Safety
//!
//! `MqttBackend` is dyn-compatible so the registry can hold heterogeneous
//! backends as `Box<dyn MqttBackend>`:
//!
//! - No generic methods and no associated types
//! - Inbound messages are pushed into a `&mut dyn MessageSink` for the
//!   duration of `run_loop`/`yield_now`, instead of being stored callbacks
//! - Errors use the shared [`BackendError`] vocabulary
//!
//! # Capabilities
//!
//! Every method has a default body, so the type system alone cannot tell a
//! real `subscribe` from a missing one. Backends therefore declare what they
//! implement through [`MqttBackend::capabilities`]; the registry and the
//! manager refuse any backend lacking one of [`Capabilities::REQUIRED`], and
//! the manager only calls optional hooks the backend declared.

use core::fmt;
use core::ops::BitOr;

use embassy_time::Duration;

use super::bridge::MessageSink;
use crate::config::{ClientConfig, LastWill};
use crate::message::Message;
use crate::packet::QoS;

/// Result type of every backend operation.
pub type BackendResult = Result<(), BackendError>;

/// Failure vocabulary shared by all backends.
///
/// The manager translates these into its own [`ErrorKind`](crate::ErrorKind)
/// together with the operation that failed (see [`translate`](super::translate)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BackendError {
    InvalidParam,
    NotInitialized,
    NotConnected,
    ConnectionFailed,
    /// The link dropped while it was believed to be up.
    ConnectionLost,
    Timeout,
    /// A buffer was too small for the packet.
    Memory,
    /// The broker sent something the backend could not make sense of.
    Protocol,
    /// Credentials were refused.
    Auth,
    /// The broker refused the request (e.g. a SUBACK failure code).
    Refused,
    /// The backend does not implement the operation.
    Unsupported,
    /// A native error code with no known meaning.
    Native(i32),
}

impl BackendError {
    /// Maps the conventional negative codes of C-style MQTT wrappers.
    ///
    /// | code | meaning |
    /// |------|---------|
    /// | -1 | invalid parameter |
    /// | -2 | not initialized |
    /// | -3 | not connected |
    /// | -4 | connection failed |
    /// | -5 | connection lost |
    /// | -6 | timeout |
    /// | -7 | out of memory |
    /// | -8 | protocol error |
    /// | -9 | authentication |
    /// | -10 .. -13 | publish / subscribe / unsubscribe / loop failure |
    ///
    /// Returns `None` for `0` (success). Anything else becomes
    /// [`BackendError::Native`].
    pub fn from_code(code: i32) -> Option<Self> {
        let err = match code {
            0 => return None,
            -1 => BackendError::InvalidParam,
            -2 => BackendError::NotInitialized,
            -3 => BackendError::NotConnected,
            -4 => BackendError::ConnectionFailed,
            -5 => BackendError::ConnectionLost,
            -6 => BackendError::Timeout,
            -7 => BackendError::Memory,
            -8 => BackendError::Protocol,
            -9 => BackendError::Auth,
            -13..=-10 => BackendError::Refused,
            other => BackendError::Native(other),
        };
        Some(err)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            BackendError::InvalidParam => "Invalid parameter",
            BackendError::NotInitialized => "Backend not initialized",
            BackendError::NotConnected => "Not connected",
            BackendError::ConnectionFailed => "Connection failed",
            BackendError::ConnectionLost => "Connection lost",
            BackendError::Timeout => "Timeout",
            BackendError::Memory => "Out of buffer space",
            BackendError::Protocol => "Protocol error",
            BackendError::Auth => "Authentication failed",
            BackendError::Refused => "Request refused by broker",
            BackendError::Unsupported => "Operation not supported by backend",
            BackendError::Native(_) => "Native backend error",
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Native(code) => write!(f, "native backend error {code}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// The set of contract operations a backend actually implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capabilities(u16);

impl Capabilities {
    pub const INIT: Self = Self(1 << 0);
    pub const CLEANUP: Self = Self(1 << 1);
    pub const CONNECT: Self = Self(1 << 2);
    pub const DISCONNECT: Self = Self(1 << 3);
    pub const IS_CONNECTED: Self = Self(1 << 4);
    pub const RECONNECT: Self = Self(1 << 5);
    pub const PUBLISH: Self = Self(1 << 6);
    pub const SUBSCRIBE: Self = Self(1 << 7);
    pub const UNSUBSCRIBE: Self = Self(1 << 8);
    pub const LOOP: Self = Self(1 << 9);
    pub const YIELD: Self = Self(1 << 10);
    pub const STATUS: Self = Self(1 << 11);
    pub const LAST_ERROR: Self = Self(1 << 12);
    pub const WILL: Self = Self(1 << 13);
    pub const CALLBACK: Self = Self(1 << 14);

    /// Operations without which a backend cannot be activated.
    pub const REQUIRED: Self = Self(
        Self::CONNECT.0
            | Self::DISCONNECT.0
            | Self::IS_CONNECTED.0
            | Self::PUBLISH.0
            | Self::SUBSCRIBE.0
            | Self::UNSUBSCRIBE.0,
    );

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self((1 << 15) - 1)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Required operations this set lacks.
    pub const fn missing_required(self) -> Self {
        Self(Self::REQUIRED.0 & !self.0)
    }

    pub const fn is_complete(self) -> bool {
        self.contains(Self::REQUIRED)
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Object-safe contract every MQTT backend implements.
///
/// All operations are synchronous. Blocking is allowed only inside the
/// transport and must be bounded by the timeouts of the [`ClientConfig`]
/// passed to [`init`](MqttBackend::init) or by the `timeout` argument of the
/// event-processing calls.
///
/// # Example
///
/// ```ignore
/// struct Loopback { connected: bool }
///
/// impl MqttBackend for Loopback {
///     fn capabilities(&self) -> Capabilities {
///         Capabilities::REQUIRED | Capabilities::LOOP
///     }
///     fn connect(&mut self) -> BackendResult { self.connected = true; Ok(()) }
///     fn disconnect(&mut self) -> BackendResult { self.connected = false; Ok(()) }
///     fn is_connected(&self) -> bool { self.connected }
///     fn publish(&mut self, _m: &Message<'_>) -> BackendResult { Ok(()) }
///     fn subscribe(&mut self, _t: &str, _q: QoS) -> BackendResult { Ok(()) }
///     fn unsubscribe(&mut self, _t: &str) -> BackendResult { Ok(()) }
/// }
/// ```
pub trait MqttBackend: Send {
    /// Operations this backend implements. Read once, at registration.
    fn capabilities(&self) -> Capabilities;

    /// Informational version string.
    fn version(&self) -> &str {
        "unknown"
    }

    /// One-time setup with the given configuration. Called again on every
    /// reconfigure.
    fn init(&mut self, _config: &ClientConfig) -> BackendResult {
        Ok(())
    }

    /// Releases everything the backend holds. Must not fail.
    fn cleanup(&mut self) {}

    fn connect(&mut self) -> BackendResult {
        Err(BackendError::Unsupported)
    }

    fn disconnect(&mut self) -> BackendResult {
        Err(BackendError::Unsupported)
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn reconnect(&mut self) -> BackendResult {
        Err(BackendError::Unsupported)
    }

    fn publish(&mut self, _message: &Message<'_>) -> BackendResult {
        Err(BackendError::Unsupported)
    }

    fn subscribe(&mut self, _topic: &str, _qos: QoS) -> BackendResult {
        Err(BackendError::Unsupported)
    }

    fn unsubscribe(&mut self, _topic: &str) -> BackendResult {
        Err(BackendError::Unsupported)
    }

    /// Processes network events for at most `timeout`, delivering inbound
    /// messages to `sink` before returning.
    fn run_loop(&mut self, _timeout: Duration, _sink: &mut dyn MessageSink) -> BackendResult {
        Ok(())
    }

    /// Non-blocking flavour of [`run_loop`](MqttBackend::run_loop).
    fn yield_now(&mut self, timeout: Duration, sink: &mut dyn MessageSink) -> BackendResult {
        self.run_loop(timeout, sink)
    }

    /// Backend-specific status code. `1` connected, `0` not connected unless
    /// the backend documents otherwise.
    fn connection_status(&self) -> i32 {
        i32::from(self.is_connected())
    }

    /// Most recent human-readable error of the backend itself.
    fn last_error(&self) -> &str {
        ""
    }

    fn set_will(&mut self, _will: &LastWill) -> BackendResult {
        Err(BackendError::Unsupported)
    }

    fn clear_will(&mut self) -> BackendResult {
        Err(BackendError::Unsupported)
    }

    /// Tells the backend whether an application message callback is
    /// installed, so it can skip delivery work when nobody listens.
    fn set_callback(&mut self, _installed: bool) -> BackendResult {
        Ok(())
    }
}
