//! # Built-in PubSub Backend
//!
//! A small PubSubClient-style MQTT 3.1.1 client over any [`Transport`]. It is
//! registered under [`BACKEND_NAME`] and is what
//! [`BackendType::PubSub`](crate::BackendType::PubSub) selects.
//!
//! The backend never waits for acknowledgements of its own requests:
//! PUBACK/SUBACK/UNSUBACK are consumed by [`run_loop`](MqttBackend::run_loop),
//! which also drives keep-alive and answers the QoS 1/2 flows of inbound
//! messages. Packets are framed in a fixed `BUF`-byte receive buffer and
//! encoded in an equally sized transmit buffer, so a packet larger than `BUF`
//! cannot be sent or received.
//!
//! ```ignore
//! let backend = PubSubBackend::<_, 1024>::new(TcpTransport::new());
//! registry.register(BACKEND_NAME, Box::new(backend))?;
//! ```

use embassy_time::{Duration, Instant};
use heapless::String;

use crate::backend::{BackendError, BackendResult, Capabilities, MessageSink, MqttBackend};
use crate::config::{ClientConfig, LastWill};
use crate::error::{ConnectReturnCode, PacketError, ProtocolError};
use crate::message::Message;
use crate::packet::{
    self, Ack, Connect, Disconnect, EncodePacket, MqttPacket, PingReq, Publish, QoS, Subscribe,
    Unsubscribe,
};
use crate::transport::Transport;
use crate::util::{decode_remaining_length, truncated};

/// Registry name of the built-in backend.
pub const BACKEND_NAME: &str = "pubsub";

/// Default size of the transmit and receive buffers.
pub const DEFAULT_BUFFER_SIZE: usize = 512;

const MAX_ERROR_LEN: usize = 128;

/// Connection state, with the numeric codes PubSubClient reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// No CONNACK or PINGRESP arrived in time.
    ConnectionTimeout,
    ConnectionLost,
    /// The transport could not be opened or the handshake was garbled.
    ConnectFailed,
    Disconnected,
    Connected,
    BadProtocol,
    BadClientId,
    Unavailable,
    BadCredentials,
    Unauthorized,
}

impl ConnectionState {
    pub const fn code(self) -> i32 {
        match self {
            ConnectionState::ConnectionTimeout => -4,
            ConnectionState::ConnectionLost => -3,
            ConnectionState::ConnectFailed => -2,
            ConnectionState::Disconnected => -1,
            ConnectionState::Connected => 0,
            ConnectionState::BadProtocol => 1,
            ConnectionState::BadClientId => 2,
            ConnectionState::Unavailable => 3,
            ConnectionState::BadCredentials => 4,
            ConnectionState::Unauthorized => 5,
        }
    }

    fn refused(code: ConnectReturnCode) -> Self {
        match code {
            ConnectReturnCode::Accepted => ConnectionState::Connected,
            ConnectReturnCode::UnacceptableProtocolVersion => ConnectionState::BadProtocol,
            ConnectReturnCode::IdentifierRejected => ConnectionState::BadClientId,
            ConnectReturnCode::ServerUnavailable => ConnectionState::Unavailable,
            ConnectReturnCode::BadUserNameOrPassword => ConnectionState::BadCredentials,
            ConnectReturnCode::NotAuthorized => ConnectionState::Unauthorized,
            ConnectReturnCode::Other(_) => ConnectionState::ConnectFailed,
        }
    }
}

/// Where the will of the next CONNECT comes from.
#[derive(Debug, Clone)]
enum WillSource {
    Config,
    Override(LastWill),
    Cleared,
}

/// MQTT 3.1.1 backend over a [`Transport`], with `BUF`-byte packet buffers.
pub struct PubSubBackend<T: Transport, const BUF: usize = DEFAULT_BUFFER_SIZE> {
    transport: T,
    config: Option<ClientConfig>,
    will: WillSource,
    state: ConnectionState,
    tx: [u8; BUF],
    rx: [u8; BUF],
    rx_len: usize,
    next_packet_id: u16,
    last_out: Instant,
    last_in: Instant,
    ping_outstanding: bool,
    deliver: bool,
    last_error: String<MAX_ERROR_LEN>,
}

impl<T: Transport, const BUF: usize> PubSubBackend<T, BUF> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: None,
            will: WillSource::Config,
            state: ConnectionState::Disconnected,
            tx: [0; BUF],
            rx: [0; BUF],
            rx_len: 0,
            next_packet_id: 1,
            last_out: Instant::from_ticks(0),
            last_in: Instant::from_ticks(0),
            ping_outstanding: false,
            deliver: true,
            last_error: String::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn fail(&mut self, err: BackendError, message: &str) -> BackendResult {
        self.last_error = truncated(message);
        Err(err)
    }

    fn succeed(&mut self, message: &str) -> BackendResult {
        self.last_error = truncated(message);
        Ok(())
    }

    fn send_timeout(&self) -> Duration {
        self.config
            .as_ref()
            .map_or(crate::config::DEFAULT_IO_TIMEOUT, |c| c.send_timeout)
    }

    fn next_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        id
    }

    /// Tears the link down after a transport or protocol failure.
    fn drop_link(&mut self, state: ConnectionState) {
        self.transport.close();
        self.state = state;
        self.rx_len = 0;
        self.ping_outstanding = false;
    }

    fn encode_error(&mut self, err: PacketError) -> BackendResult {
        match err {
            PacketError::BufferTooSmall | PacketError::Protocol(ProtocolError::PayloadTooLarge) => {
                self.fail(BackendError::Memory, "Packet exceeds buffer size")
            }
            PacketError::Protocol(_) => self.fail(BackendError::InvalidParam, "Packet could not be encoded"),
        }
    }

    /// Sends the first `len` bytes of the transmit buffer.
    fn write_tx(&mut self, len: usize) -> BackendResult {
        let timeout = self.send_timeout();
        if self.transport.send(&self.tx[..len], timeout).is_err() {
            warn!("transport send failed");
            self.drop_link(ConnectionState::ConnectionLost);
            return self.fail(BackendError::ConnectionLost, "Connection lost while sending");
        }
        self.last_out = Instant::now();
        Ok(())
    }

    fn send_packet<P: EncodePacket>(&mut self, packet: &P) -> BackendResult {
        match packet.encode(&mut self.tx) {
            Ok(len) => self.write_tx(len),
            Err(err) => self.encode_error(err),
        }
    }

    /// Length of the complete packet at the head of the receive buffer, if
    /// one is there.
    fn buffered_frame(&self) -> Result<Option<usize>, PacketError> {
        if self.rx_len < 2 {
            return Ok(None);
        }
        let Some((remaining, len_bytes)) = decode_remaining_length(&self.rx[1..self.rx_len])?
        else {
            return Ok(None);
        };
        let total = 1 + len_bytes + remaining;
        if total > BUF {
            return Err(PacketError::BufferTooSmall);
        }
        Ok((self.rx_len >= total).then_some(total))
    }

    /// Waits at most `timeout` for one complete packet and returns its length.
    fn read_frame(&mut self, timeout: Duration) -> Result<Option<usize>, BackendError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.buffered_frame() {
                Ok(Some(len)) => return Ok(Some(len)),
                Ok(None) => {}
                Err(_) => {
                    self.drop_link(ConnectionState::ConnectionLost);
                    self.last_error = truncated("Inbound packet exceeds buffer size");
                    return Err(BackendError::Memory);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.as_ticks() == 0 {
                return Ok(None);
            }
            match self.transport.recv(&mut self.rx[self.rx_len..], remaining) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    self.rx_len += n;
                    self.last_in = Instant::now();
                }
                Err(_) => {
                    warn!("transport receive failed");
                    self.drop_link(ConnectionState::ConnectionLost);
                    self.last_error = truncated("Connection lost");
                    return Err(BackendError::ConnectionLost);
                }
            }
        }
    }

    /// Drops the first `len` bytes of the receive buffer.
    fn consume(&mut self, len: usize) {
        self.rx.copy_within(len..self.rx_len, 0);
        self.rx_len -= len;
    }

    fn await_connack(&mut self, timeout: Duration) -> BackendResult {
        let Some(len) = self.read_frame(timeout)? else {
            self.drop_link(ConnectionState::ConnectionTimeout);
            return self.fail(BackendError::Timeout, "Timed out waiting for CONNACK");
        };

        let code = match packet::decode(&self.rx[..len]) {
            Ok(Some(MqttPacket::ConnAck(ack))) => Some(ConnectReturnCode::from(ack.return_code)),
            _ => None,
        };
        self.consume(len);

        match code {
            Some(ConnectReturnCode::Accepted) => {
                self.state = ConnectionState::Connected;
                self.last_in = Instant::now();
                self.ping_outstanding = false;
                self.succeed("Connected")
            }
            Some(code) => {
                warn!("broker refused connection with code {}", code.as_u8());
                self.drop_link(ConnectionState::refused(code));
                match code {
                    ConnectReturnCode::BadUserNameOrPassword | ConnectReturnCode::NotAuthorized => {
                        self.fail(BackendError::Auth, "Broker refused credentials")
                    }
                    _ => self.fail(BackendError::ConnectionFailed, "Broker refused connection"),
                }
            }
            None => {
                self.drop_link(ConnectionState::ConnectFailed);
                self.fail(BackendError::Protocol, "Expected CONNACK")
            }
        }
    }

    /// Sends PINGREQ when the link has been idle for the keep-alive interval,
    /// and gives up when the previous one went unanswered.
    fn keep_alive(&mut self) -> BackendResult {
        let interval = self
            .config
            .as_ref()
            .map_or(Duration::from_ticks(0), |c| c.keep_alive);
        if interval.as_ticks() == 0 {
            return Ok(());
        }

        if self.last_in.elapsed() < interval && self.last_out.elapsed() < interval {
            return Ok(());
        }
        if self.ping_outstanding {
            warn!("PINGRESP overdue, dropping connection");
            self.drop_link(ConnectionState::ConnectionTimeout);
            return self.fail(BackendError::Timeout, "Keep-alive timeout");
        }

        trace!("sending PINGREQ");
        self.send_packet(&PingReq)?;
        self.last_in = Instant::now();
        self.ping_outstanding = true;
        Ok(())
    }

    /// Handles the packet at the head of the receive buffer.
    fn dispatch(&mut self, len: usize, sink: &mut dyn MessageSink) -> BackendResult {
        let reply = match packet::decode(&self.rx[..len]) {
            Ok(Some(MqttPacket::Publish(publish))) => {
                debug!("received PUBLISH on {}", publish.topic);
                if self.deliver {
                    sink.on_publish(&publish);
                }
                match (publish.qos, publish.packet_id) {
                    (QoS::AtLeastOnce, Some(id)) => Some(Ack::PubAck(id)),
                    (QoS::ExactlyOnce, Some(id)) => Some(Ack::PubRec(id)),
                    _ => None,
                }
            }
            Ok(Some(MqttPacket::PubRel(id))) => Some(Ack::PubComp(id)),
            Ok(Some(MqttPacket::PubRec(id))) => Some(Ack::PubRel(id)),
            Ok(Some(MqttPacket::PingResp)) => {
                self.ping_outstanding = false;
                None
            }
            Ok(Some(MqttPacket::SubAck(ack))) => {
                if ack.is_failure() {
                    warn!("broker refused subscription {}", ack.packet_id);
                    self.last_error = truncated("Subscription refused by broker");
                }
                None
            }
            Ok(Some(MqttPacket::Disconnect)) => {
                self.drop_link(ConnectionState::ConnectionLost);
                return self.fail(BackendError::ConnectionLost, "Broker closed the session");
            }
            Ok(Some(_)) | Ok(None) => None,
            Err(_) => {
                self.drop_link(ConnectionState::ConnectionLost);
                return self.fail(BackendError::Protocol, "Malformed packet from broker");
            }
        };
        self.consume(len);

        match reply {
            Some(ack) => self.send_packet(&ack),
            None => Ok(()),
        }
    }
}

fn encode_connect(
    config: &ClientConfig,
    will: &WillSource,
    buf: &mut [u8],
) -> Result<usize, PacketError> {
    let mut packet = Connect::new(
        config.client_id.as_str(),
        config.keep_alive_secs().unwrap_or(u16::MAX),
        config.clean_session,
    );
    packet.will = match will {
        WillSource::Config => config.will.as_ref().map(LastWill::as_packet),
        WillSource::Override(will) => Some(will.as_packet()),
        WillSource::Cleared => None,
    };
    packet.username = config.username.as_deref();
    packet.password = config.password.as_ref().map(|p| p.as_bytes());
    packet.encode(buf)
}

impl<T: Transport + Send, const BUF: usize> MqttBackend for PubSubBackend<T, BUF> {
    fn capabilities(&self) -> Capabilities {
        Capabilities::all().without(Capabilities::YIELD)
    }

    fn version(&self) -> &str {
        concat!("pubsub-", env!("CARGO_PKG_VERSION"))
    }

    fn init(&mut self, config: &ClientConfig) -> BackendResult {
        if config.port_u16().is_none() {
            return self.fail(BackendError::InvalidParam, "Invalid broker port");
        }
        self.config = Some(config.clone());
        self.will = WillSource::Config;
        self.succeed("Initialized")
    }

    fn cleanup(&mut self) {
        if self.is_connected() {
            let _ = self.send_packet(&Disconnect);
        }
        self.drop_link(ConnectionState::Disconnected);
        self.config = None;
        self.will = WillSource::Config;
        self.last_error.clear();
    }

    fn connect(&mut self) -> BackendResult {
        if self.is_connected() {
            return Ok(());
        }
        let Some(config) = self.config.as_ref() else {
            return self.fail(BackendError::NotInitialized, "Backend not initialized");
        };
        let Some(port) = config.port_u16() else {
            return self.fail(BackendError::InvalidParam, "Invalid broker port");
        };
        let timeout = config.connect_timeout;

        self.transport.close();
        self.rx_len = 0;
        self.ping_outstanding = false;
        info!("connecting to {}:{}", config.host.as_str(), port);
        if self.transport.open(config.host.as_str(), port, timeout).is_err() {
            self.drop_link(ConnectionState::ConnectFailed);
            return self.fail(BackendError::ConnectionFailed, "Transport connection failed");
        }

        let encoded = encode_connect(config, &self.will, &mut self.tx);
        match encoded {
            Ok(len) => self.write_tx(len)?,
            Err(err) => {
                self.drop_link(ConnectionState::ConnectFailed);
                return self.encode_error(err);
            }
        }
        self.await_connack(timeout)
    }

    fn disconnect(&mut self) -> BackendResult {
        if self.is_connected() {
            let sent = self.send_packet(&Disconnect);
            self.drop_link(ConnectionState::Disconnected);
            sent?;
        } else {
            self.drop_link(ConnectionState::Disconnected);
        }
        self.succeed("Disconnected")
    }

    fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.transport.is_open()
    }

    fn reconnect(&mut self) -> BackendResult {
        let _ = self.disconnect();
        self.connect()
    }

    fn publish(&mut self, message: &Message<'_>) -> BackendResult {
        if !self.is_connected() {
            return self.fail(BackendError::NotConnected, "Not connected");
        }
        let packet_id = match message.qos {
            QoS::AtMostOnce => None,
            _ => Some(match message.message_id {
                Some(id) => id,
                None => self.next_id(),
            }),
        };
        let packet = Publish {
            topic: message.topic,
            qos: message.qos,
            retain: message.retained,
            dup: false,
            payload: message.payload,
            packet_id,
        };
        self.send_packet(&packet)?;
        self.succeed("Published")
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> BackendResult {
        if !self.is_connected() {
            return self.fail(BackendError::NotConnected, "Not connected");
        }
        let id = self.next_id();
        self.send_packet(&Subscribe::new(id, topic, qos))?;
        self.succeed("Subscribe sent")
    }

    fn unsubscribe(&mut self, topic: &str) -> BackendResult {
        if !self.is_connected() {
            return self.fail(BackendError::NotConnected, "Not connected");
        }
        let id = self.next_id();
        self.send_packet(&Unsubscribe::new(id, topic))?;
        self.succeed("Unsubscribe sent")
    }

    fn run_loop(&mut self, timeout: Duration, sink: &mut dyn MessageSink) -> BackendResult {
        if !self.is_connected() {
            return self.fail(BackendError::NotConnected, "Not connected");
        }
        self.keep_alive()?;
        match self.read_frame(timeout)? {
            Some(len) => self.dispatch(len, sink),
            None => Ok(()),
        }
    }

    fn connection_status(&self) -> i32 {
        self.state.code()
    }

    fn last_error(&self) -> &str {
        self.last_error.as_str()
    }

    fn set_will(&mut self, will: &LastWill) -> BackendResult {
        if will.topic.is_empty() {
            return self.fail(BackendError::InvalidParam, "Last will topic is empty");
        }
        self.will = WillSource::Override(will.clone());
        self.succeed("Last will set")
    }

    fn clear_will(&mut self) -> BackendResult {
        self.will = WillSource::Cleared;
        self.succeed("Last will cleared")
    }

    fn set_callback(&mut self, installed: bool) -> BackendResult {
        self.deliver = installed;
        Ok(())
    }
}
