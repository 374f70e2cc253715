//! Client configuration and its validation.
//!
//! [`ClientConfig`] is a plain value: the manager keeps its own copy from the
//! moment [`configure`](crate::ClientManager::configure) succeeds, and
//! backends receive it by reference in [`MqttBackend::init`](crate::MqttBackend::init).
//! Strings are bounded (`heapless`) so a config fits in static memory.

use core::fmt;

use embassy_time::Duration;
use heapless::{String, Vec};

use crate::error::ErrorKind;
use crate::packet::{QoS, Will};
use crate::util::truncated;

/// Maximum broker host length.
pub const MAX_HOST_LEN: usize = 256;
/// Maximum client identifier length.
pub const MAX_CLIENT_ID_LEN: usize = 128;
/// Maximum username / password length.
pub const MAX_CREDENTIAL_LEN: usize = 128;
/// Maximum topic length, for both the will topic and published messages.
pub const MAX_TOPIC_LEN: usize = 256;
/// Maximum Last-Will payload size.
pub const MAX_WILL_PAYLOAD_LEN: usize = 512;

/// Broker port used when `create_default_config` is given port 0.
pub const DEFAULT_PORT: u32 = 1883;
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(5_000);
pub const DEFAULT_MAX_RETRY_COUNT: u8 = 3;

/// A Last-Will-and-Testament published by the broker if the client vanishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String<MAX_TOPIC_LEN>,
    pub payload: Vec<u8, MAX_WILL_PAYLOAD_LEN>,
    pub qos: QoS,
    pub retain: bool,
}

impl LastWill {
    /// Builds a will, truncating the topic and payload to their capacity.
    pub fn new(topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Self {
        let payload = &payload[..payload.len().min(MAX_WILL_PAYLOAD_LEN)];
        Self {
            topic: truncated(topic),
            payload: Vec::from_slice(payload).unwrap_or_default(),
            qos,
            retain,
        }
    }

    /// Borrowed wire view used when encoding CONNECT.
    pub fn as_packet(&self) -> Will<'_> {
        Will {
            topic: self.topic.as_str(),
            payload: &self.payload,
            qos: self.qos,
            retain: self.retain,
        }
    }
}

/// Connection parameters handed to the active backend.
///
/// `retry_interval` and `max_retry_count` are descriptive: a backend may honor
/// them, the manager never retries on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String<MAX_HOST_LEN>,
    /// Kept wider than `u16` so that out-of-range ports are reported by
    /// [`validate_config`] instead of silently wrapping.
    pub port: u32,
    pub client_id: String<MAX_CLIENT_ID_LEN>,
    pub username: Option<String<MAX_CREDENTIAL_LEN>>,
    pub password: Option<String<MAX_CREDENTIAL_LEN>>,
    pub keep_alive: Duration,
    pub clean_session: bool,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub recv_timeout: Duration,
    pub retry_interval: Duration,
    pub max_retry_count: u8,
    pub will: Option<LastWill>,
    /// QoS used by [`ClientConfig::with_will`] when the caller does not care.
    pub default_will_qos: QoS,
}

impl ClientConfig {
    /// Sets username and password.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(truncated(username));
        self.password = Some(truncated(password));
        self
    }

    /// Sets a non-retained will with the default will QoS.
    pub fn with_will(mut self, topic: &str, payload: &[u8]) -> Self {
        self.will = Some(LastWill::new(topic, payload, self.default_will_qos, false));
        self
    }

    /// Sets a fully specified will.
    pub fn with_last_will(mut self, will: LastWill) -> Self {
        self.will = Some(will);
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, send: Duration, recv: Duration) -> Self {
        self.connect_timeout = connect;
        self.send_timeout = send;
        self.recv_timeout = recv;
        self
    }

    /// The port as sent on the wire. Only meaningful after validation.
    pub fn port_u16(&self) -> Option<u16> {
        u16::try_from(self.port).ok().filter(|p| *p != 0)
    }

    /// Keep-alive in whole seconds, as carried by CONNECT.
    pub fn keep_alive_secs(&self) -> Option<u16> {
        u16::try_from(self.keep_alive.as_secs()).ok()
    }
}

/// Builds a configuration with the framework defaults.
///
/// Port 0 selects [`DEFAULT_PORT`]. Strings longer than their bounded capacity
/// are truncated; an empty host or client id is kept as-is and rejected later
/// by [`validate_config`].
pub fn create_default_config(host: &str, port: u32, client_id: &str) -> ClientConfig {
    ClientConfig {
        host: truncated(host),
        port: if port > 0 { port } else { DEFAULT_PORT },
        client_id: truncated(client_id),
        username: None,
        password: None,
        keep_alive: DEFAULT_KEEP_ALIVE,
        clean_session: true,
        connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        send_timeout: DEFAULT_IO_TIMEOUT,
        recv_timeout: DEFAULT_IO_TIMEOUT,
        retry_interval: DEFAULT_RETRY_INTERVAL,
        max_retry_count: DEFAULT_MAX_RETRY_COUNT,
        will: None,
        default_will_qos: QoS::AtLeastOnce,
    }
}

/// Why a configuration was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    EmptyHost,
    InvalidPort(u32),
    EmptyClientId,
    KeepAliveTooLong,
    EmptyWillTopic,
    PasswordWithoutUsername,
}

impl ConfigError {
    pub const fn as_str(self) -> &'static str {
        match self {
            ConfigError::EmptyHost => "Broker host is empty",
            ConfigError::InvalidPort(_) => "Invalid broker port",
            ConfigError::EmptyClientId => "Client ID is empty",
            ConfigError::KeepAliveTooLong => "Keep-alive exceeds 65535 seconds",
            ConfigError::EmptyWillTopic => "Last will topic is empty",
            ConfigError::PasswordWithoutUsername => "Password set without username",
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ConfigError> for ErrorKind {
    fn from(_: ConfigError) -> Self {
        ErrorKind::InvalidParam
    }
}

/// Checks the invariants every backend may rely on. Pure: no logging, no
/// state.
pub fn validate_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.host.is_empty() {
        return Err(ConfigError::EmptyHost);
    }
    if config.port == 0 || config.port > u32::from(u16::MAX) {
        return Err(ConfigError::InvalidPort(config.port));
    }
    if config.client_id.is_empty() {
        return Err(ConfigError::EmptyClientId);
    }
    if config.keep_alive_secs().is_none() {
        return Err(ConfigError::KeepAliveTooLong);
    }
    if let Some(will) = &config.will
        && will.topic.is_empty()
    {
        return Err(ConfigError::EmptyWillTopic);
    }
    if config.password.is_some() && config.username.is_none() {
        return Err(ConfigError::PasswordWithoutUsername);
    }
    Ok(())
}
