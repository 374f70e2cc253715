//! Callback bridge between backends and the application.
//!
//! Two directions cross the backend boundary:
//!
//! - **Inbound messages.** A backend reports what it received in whatever shape
//!   it has on hand (a decoded PUBLISH, or raw topic bytes from a vendor SDK)
//!   through the object-safe [`MessageSink`]. The manager hands its
//!   [`CallbackBridge`] to the backend as that sink for the duration of each
//!   `run_loop`/`yield_now` call, and the bridge forwards straight into the
//!   one application callback. No buffering, no queue, no filtering: the
//!   callback runs synchronously on the caller's stack, so it must not block.
//!
//! - **Errors.** [`translate`] is the explicit table from a backend failure
//!   plus the operation that produced it to the manager's [`ErrorKind`].

use alloc::boxed::Box;

use super::traits::BackendError;
use crate::error::ErrorKind;
use crate::packet::Publish;

/// Canonical application callback: `(topic, payload)`. Any user data is
/// captured by the closure.
pub type MessageCallback = Box<dyn FnMut(&str, &[u8]) + Send>;

/// Connection-state callback.
pub type ConnectionCallback = Box<dyn FnMut(ConnectionEvent) + Send>;

/// What the manager observed about the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionEvent {
    Connected,
    /// The application asked to disconnect, or the manager tore the link down
    /// during a backend switch or cleanup.
    Disconnected,
    /// A connect or reconnect attempt failed with the given kind.
    ConnectFailed(ErrorKind),
}

/// Object-safe receiver for inbound messages.
///
/// Backends call one of the `on_*` methods per delivered message, from inside
/// `run_loop`/`yield_now` only.
pub trait MessageSink {
    /// Deliver a message in canonical form.
    fn on_message(&mut self, topic: &str, payload: &[u8]);

    /// Deliver a decoded PUBLISH packet.
    fn on_publish(&mut self, publish: &Publish<'_>) {
        self.on_message(publish.topic, publish.payload);
    }

    /// Deliver a message whose topic arrived as raw bytes. Topics that are not
    /// UTF-8 are dropped.
    fn on_raw(&mut self, topic: &[u8], payload: &[u8]) {
        match core::str::from_utf8(topic) {
            Ok(topic) => self.on_message(topic, payload),
            Err(_) => {
                warn!("dropping message with non UTF-8 topic ({} bytes)", topic.len());
            }
        }
    }
}

/// Forwards inbound messages to the application callback, if one is set.
#[derive(Default)]
pub struct CallbackBridge {
    callback: Option<MessageCallback>,
}

impl CallbackBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the application callback.
    pub fn install(&mut self, callback: MessageCallback) {
        self.callback = Some(callback);
    }

    pub fn clear(&mut self) {
        self.callback = None;
    }

    pub fn is_installed(&self) -> bool {
        self.callback.is_some()
    }
}

impl MessageSink for CallbackBridge {
    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        match self.callback.as_mut() {
            Some(callback) => callback(topic, payload),
            None => trace!("no callback installed, dropping message on {}", topic),
        }
    }
}

/// The manager operation a backend failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Operation {
    Init,
    Connect,
    Disconnect,
    Reconnect,
    Publish,
    Subscribe,
    Unsubscribe,
    Loop,
    Will,
    Callback,
}

impl Operation {
    /// The kind a request-level failure of this operation collapses to.
    const fn failure_kind(self) -> ErrorKind {
        match self {
            Operation::Connect | Operation::Reconnect => ErrorKind::ConnectionFailed,
            Operation::Publish => ErrorKind::PublishFailed,
            Operation::Subscribe => ErrorKind::SubscribeFailed,
            Operation::Unsubscribe => ErrorKind::UnsubscribeFailed,
            Operation::Loop => ErrorKind::LoopFailed,
            Operation::Init | Operation::Disconnect | Operation::Will | Operation::Callback => {
                ErrorKind::Unknown
            }
        }
    }
}

/// Translates a backend failure into the manager's taxonomy.
///
/// | backend error | manager kind |
/// |---------------|--------------|
/// | `InvalidParam` | `InvalidParam` |
/// | `Unsupported` | `InvalidParam` |
/// | `NotInitialized`, `NotConnected` | `NotConnected` |
/// | `ConnectionFailed`, `ConnectionLost`, `Auth` | `ConnectionFailed` |
/// | `Timeout` | `Timeout` |
/// | `Memory` | `MemoryError` |
/// | `Protocol`, `Refused` | per operation: `ConnectionFailed`, `PublishFailed`, `SubscribeFailed`, `UnsubscribeFailed`, `LoopFailed`, else `Unknown` |
/// | `Native(_)` | `Unknown` |
pub fn translate(op: Operation, err: BackendError) -> ErrorKind {
    match err {
        BackendError::InvalidParam | BackendError::Unsupported => ErrorKind::InvalidParam,
        BackendError::NotInitialized | BackendError::NotConnected => ErrorKind::NotConnected,
        BackendError::ConnectionFailed | BackendError::ConnectionLost | BackendError::Auth => {
            ErrorKind::ConnectionFailed
        }
        BackendError::Timeout => ErrorKind::Timeout,
        BackendError::Memory => ErrorKind::MemoryError,
        BackendError::Protocol | BackendError::Refused => op.failure_kind(),
        BackendError::Native(_) => ErrorKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::QoS;
    use std::sync::{Arc, Mutex};

    #[test]
    fn forwards_to_installed_callback() {
        let seen = Arc::new(Mutex::new(std::vec::Vec::new()));
        let sink = seen.clone();

        let mut bridge = CallbackBridge::new();
        bridge.on_message("ignored", b"before install");
        bridge.install(Box::new(move |topic, payload| {
            sink.lock().unwrap().push((topic.to_owned(), payload.to_vec()));
        }));

        bridge.on_publish(&Publish {
            topic: "sensors/temp",
            qos: QoS::AtMostOnce,
            retain: false,
            dup: false,
            payload: b"23.5",
            packet_id: None,
        });
        bridge.on_raw(b"raw/topic", b"x");
        bridge.on_raw(&[0xFF, 0xFE], b"dropped");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], ("sensors/temp".to_owned(), b"23.5".to_vec()));
        assert_eq!(seen[1].0, "raw/topic");
    }

    #[test]
    fn cleared_bridge_drops_messages() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let mut bridge = CallbackBridge::new();
        bridge.install(Box::new(move |_, _| *counter.lock().unwrap() += 1));
        bridge.on_message("a", b"");
        bridge.clear();
        bridge.on_message("a", b"");
        assert_eq!(*hits.lock().unwrap(), 1);
        assert!(!bridge.is_installed());
    }

    #[test]
    fn request_failures_depend_on_operation() {
        assert_eq!(
            translate(Operation::Publish, BackendError::Refused),
            ErrorKind::PublishFailed
        );
        assert_eq!(
            translate(Operation::Subscribe, BackendError::Protocol),
            ErrorKind::SubscribeFailed
        );
        assert_eq!(
            translate(Operation::Unsubscribe, BackendError::Refused),
            ErrorKind::UnsubscribeFailed
        );
        assert_eq!(
            translate(Operation::Loop, BackendError::Protocol),
            ErrorKind::LoopFailed
        );
        assert_eq!(
            translate(Operation::Connect, BackendError::Auth),
            ErrorKind::ConnectionFailed
        );
    }

    #[test]
    fn unknown_native_codes_collapse() {
        assert_eq!(
            translate(Operation::Publish, BackendError::Native(-1234)),
            ErrorKind::Unknown
        );
        assert_eq!(
            translate(Operation::Loop, BackendError::Timeout),
            ErrorKind::Timeout
        );
    }
}
