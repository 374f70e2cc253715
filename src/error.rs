//! # Error Types
//!
//! This module defines the error types used throughout the crate: the closed
//! [`ErrorKind`] taxonomy every public manager operation reports, and the
//! protocol-level errors produced by the packet codec of the built-in PubSub
//! backend.

use core::fmt;

/// Result type returned by every public [`ClientManager`](crate::ClientManager) operation.
pub type Result<T> = core::result::Result<T, ErrorKind>;

/// The closed error taxonomy of the client manager.
///
/// Success is expressed as `Ok(..)`; every failure collapses into one of these
/// kinds. Backend-specific failures are translated into this set at the
/// manager boundary (see [`translate`](crate::backend::translate)) and never
/// leak as raw integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// A parameter was empty, out of range or otherwise unusable.
    InvalidParam,
    /// The operation needs a live broker connection (or a configured client).
    NotConnected,
    /// The connection attempt failed or the link was lost.
    ConnectionFailed,
    /// A bounded wait inside the backend elapsed.
    Timeout,
    /// A fixed-size buffer or allocation could not hold the data.
    MemoryError,
    /// No backend is available for the operation.
    BackendNotFound,
    /// `connect` was called while the backend reports a live connection.
    AlreadyConnected,
    /// A backend with the same name is already registered.
    AlreadyRegistered,
    /// The backend registry is full.
    CapacityExceeded,
    /// The backend failed to publish.
    PublishFailed,
    /// The backend failed to subscribe.
    SubscribeFailed,
    /// The backend failed to unsubscribe.
    UnsubscribeFailed,
    /// Event processing inside `run_loop`/`yield_now` failed.
    LoopFailed,
    /// Anything the translation table does not know about.
    Unknown,
}

impl ErrorKind {
    /// Canonical human-readable description of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidParam => "Invalid parameter",
            ErrorKind::NotConnected => "Not connected",
            ErrorKind::ConnectionFailed => "Connection failed",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::MemoryError => "Memory allocation error",
            ErrorKind::BackendNotFound => "Backend not found",
            ErrorKind::AlreadyConnected => "Already connected",
            ErrorKind::AlreadyRegistered => "Backend already registered",
            ErrorKind::CapacityExceeded => "Too many backends registered",
            ErrorKind::PublishFailed => "Publish failed",
            ErrorKind::SubscribeFailed => "Subscribe failed",
            ErrorKind::UnsubscribeFailed => "Unsubscribe failed",
            ErrorKind::LoopFailed => "Loop failed",
            ErrorKind::Unknown => "Unknown error",
        }
    }

    /// Stable negative integer code, for embedders that report status over a
    /// C ABI or a telemetry channel. `0` is reserved for success.
    pub const fn code(self) -> i32 {
        match self {
            ErrorKind::InvalidParam => -1,
            ErrorKind::NotConnected => -2,
            ErrorKind::ConnectionFailed => -3,
            ErrorKind::Timeout => -4,
            ErrorKind::MemoryError => -5,
            ErrorKind::BackendNotFound => -6,
            ErrorKind::AlreadyConnected => -7,
            ErrorKind::PublishFailed => -8,
            ErrorKind::SubscribeFailed => -9,
            ErrorKind::UnsubscribeFailed => -10,
            ErrorKind::LoopFailed => -11,
            ErrorKind::AlreadyRegistered => -12,
            ErrorKind::CapacityExceeded => -13,
            ErrorKind::Unknown => -99,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::error::Error for ErrorKind {}

/// Represents the return codes of a connection refusal (`CONNACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConnectReturnCode {
    /// The connection was accepted.
    Accepted = 0,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion = 1,
    /// The client identifier is not valid.
    IdentifierRejected = 2,
    /// The broker is unavailable.
    ServerUnavailable = 3,
    /// The username or password is not valid.
    BadUserNameOrPassword = 4,
    /// The client is not authorized to connect.
    NotAuthorized = 5,
    /// A code outside the MQTT 3.1.1 range.
    Other(u8),
}

impl From<u8> for ConnectReturnCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Accepted,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

impl ConnectReturnCode {
    /// The raw CONNACK byte.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Accepted => 0,
            Self::UnacceptableProtocolVersion => 1,
            Self::IdentifierRejected => 2,
            Self::ServerUnavailable => 3,
            Self::BadUserNameOrPassword => 4,
            Self::NotAuthorized => 5,
            Self::Other(val) => val,
        }
    }
}

/// Enumerates specific MQTT protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid packet type was received.
    InvalidPacketType(u8),
    /// The server sent an invalid or unexpected response.
    InvalidResponse,
    /// The connection was closed by the broker.
    ConnectionClosed,
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// The payload of a message exceeds the maximum allowable size.
    PayloadTooLarge,
    /// A string was not valid UTF-8.
    InvalidUtf8String,
}

/// Errors produced while encoding or decoding control packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketError {
    /// A protocol-level error occurred.
    Protocol(ProtocolError),
    /// The buffer provided for an operation was too small.
    BufferTooSmall,
}

impl From<ProtocolError> for PacketError {
    fn from(err: ProtocolError) -> Self {
        PacketError::Protocol(err)
    }
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::BufferTooSmall => f.write_str("packet buffer too small"),
            PacketError::Protocol(ProtocolError::InvalidPacketType(t)) => {
                write!(f, "invalid packet type {t}")
            }
            PacketError::Protocol(ProtocolError::InvalidResponse) => {
                f.write_str("unexpected response from broker")
            }
            PacketError::Protocol(ProtocolError::ConnectionClosed) => {
                f.write_str("connection closed by broker")
            }
            PacketError::Protocol(ProtocolError::MalformedPacket) => f.write_str("malformed packet"),
            PacketError::Protocol(ProtocolError::PayloadTooLarge) => f.write_str("payload too large"),
            PacketError::Protocol(ProtocolError::InvalidUtf8String) => {
                f.write_str("string is not valid UTF-8")
            }
        }
    }
}
