//! # MQTT Packet Structures and Serialization
//!
//! MQTT 3.1.1 control packets spoken by the built-in
//! [`PubSubBackend`](crate::pubsub::PubSubBackend), and the traits for
//! encoding them into and decoding them from a byte buffer.
//!
//! Encoders reserve four bytes for the remaining length, write the body, then
//! compact the body against the real length prefix. Decoders expect one
//! complete packet, fixed header included.

use crate::error::{PacketError, ProtocolError};
use crate::util::{
    self, read_u16, read_utf8_string, write_binary, write_u8, write_u16, write_utf8_string,
};
use heapless::Vec;

/// Maximum number of topic filters carried by one SUBSCRIBE/UNSUBSCRIBE.
pub const MAX_FILTERS: usize = 8;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    /// At most once.
    #[default]
    AtMostOnce = 0,
    /// At least once.
    AtLeastOnce = 1,
    /// Exactly once.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = ProtocolError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(ProtocolError::MalformedPacket),
        }
    }
}

/// A trait for packets that can be encoded into a byte buffer.
pub trait EncodePacket {
    /// Encodes the packet at the start of `buf`, returning its length.
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError>;
}

/// A trait for packets that can be decoded from a byte buffer.
pub trait DecodePacket<'a>: Sized {
    /// Decodes one complete packet, fixed header included.
    fn decode(buf: &'a [u8]) -> Result<Self, PacketError>;
}

/// Packets a client can receive from a broker.
#[derive(Debug)]
pub enum MqttPacket<'a> {
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    PubAck(u16),
    PubRec(u16),
    PubRel(u16),
    PubComp(u16),
    SubAck(SubAck),
    UnsubAck(u16),
    PingReq,
    PingResp,
    Disconnect,
}

/// Decodes a raw byte buffer into a specific `MqttPacket`.
pub fn decode(buf: &[u8]) -> Result<Option<MqttPacket<'_>>, PacketError> {
    let Some(first) = buf.first() else {
        return Ok(None);
    };

    let packet_type = first >> 4;
    let packet = match packet_type {
        2 => MqttPacket::ConnAck(ConnAck::decode(buf)?),
        3 => MqttPacket::Publish(Publish::decode(buf)?),
        4 => MqttPacket::PubAck(decode_packet_id(buf)?),
        5 => MqttPacket::PubRec(decode_packet_id(buf)?),
        6 => MqttPacket::PubRel(decode_packet_id(buf)?),
        7 => MqttPacket::PubComp(decode_packet_id(buf)?),
        9 => MqttPacket::SubAck(SubAck::decode(buf)?),
        11 => MqttPacket::UnsubAck(decode_packet_id(buf)?),
        12 => MqttPacket::PingReq,
        13 => MqttPacket::PingResp,
        14 => MqttPacket::Disconnect,
        _ => return Err(ProtocolError::InvalidPacketType(packet_type).into()),
    };

    Ok(Some(packet))
}

/// Writes `first_byte`, then the body produced by `body`, then fixes up the
/// remaining-length prefix.
fn encode_with_header<F>(buf: &mut [u8], first_byte: u8, body: F) -> Result<usize, PacketError>
where
    F: FnOnce(&mut usize, &mut [u8]) -> Result<(), PacketError>,
{
    let mut cursor = 0;
    write_u8(&mut cursor, buf, first_byte)?;
    let remaining_len_pos = cursor;
    cursor += 4;
    let content_start = cursor;
    body(&mut cursor, buf)?;

    let remaining_len = cursor - content_start;
    let len_bytes = util::write_variable_byte_integer_len(&mut buf[remaining_len_pos..], remaining_len)?;
    let header_len = 1 + len_bytes;
    buf.copy_within(content_start..cursor, header_len);
    Ok(header_len + remaining_len)
}

/// Returns the body of a complete packet (everything after the fixed header).
fn packet_body(buf: &[u8]) -> Result<&[u8], PacketError> {
    let mut cursor = 1;
    let remaining_len = util::read_variable_byte_integer(&mut cursor, buf)?;
    buf.get(cursor..cursor + remaining_len)
        .ok_or_else(|| ProtocolError::MalformedPacket.into())
}

fn decode_packet_id(buf: &[u8]) -> Result<u16, PacketError> {
    let body = packet_body(buf)?;
    let mut cursor = 0;
    read_u16(&mut cursor, body)
}

// --- CONNECT Packet ---

/// Last-Will-and-Testament carried inside CONNECT.
#[derive(Debug, Clone, Copy)]
pub struct Will<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Debug)]
pub struct Connect<'a> {
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: &'a str,
    pub will: Option<Will<'a>>,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session,
            will: None,
            username: None,
            password: None,
        }
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= 0x02;
        }
        if let Some(will) = &self.will {
            flags |= 0x04 | ((will.qos as u8) << 3);
            if will.retain {
                flags |= 0x20;
            }
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        flags
    }
}

impl EncodePacket for Connect<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        encode_with_header(buf, 0x10, |cursor, buf| {
            write_utf8_string(cursor, buf, PROTOCOL_NAME)?;
            write_u8(cursor, buf, PROTOCOL_LEVEL)?;
            write_u8(cursor, buf, self.flags())?;
            write_u16(cursor, buf, self.keep_alive)?;
            write_utf8_string(cursor, buf, self.client_id)?;
            if let Some(will) = &self.will {
                write_utf8_string(cursor, buf, will.topic)?;
                write_binary(cursor, buf, will.payload)?;
            }
            if let Some(username) = self.username {
                write_utf8_string(cursor, buf, username)?;
            }
            if let Some(password) = self.password {
                write_binary(cursor, buf, password)?;
            }
            Ok(())
        })
    }
}

// --- CONNACK Packet ---
#[derive(Debug, Clone, Copy)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

impl<'a> DecodePacket<'a> for ConnAck {
    fn decode(buf: &'a [u8]) -> Result<Self, PacketError> {
        let body = packet_body(buf)?;
        if body.len() != 2 {
            return Err(ProtocolError::MalformedPacket.into());
        }
        Ok(Self {
            session_present: (body[0] & 0x01) != 0,
            return_code: body[1],
        })
    }
}

// --- PUBLISH Packet ---
#[derive(Debug)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub payload: &'a [u8],
    pub packet_id: Option<u16>,
}

impl<'a> DecodePacket<'a> for Publish<'a> {
    fn decode(buf: &'a [u8]) -> Result<Self, PacketError> {
        let flags = buf.first().ok_or(ProtocolError::MalformedPacket)? & 0x0F;
        let qos = QoS::try_from((flags >> 1) & 0x03)?;
        let body = packet_body(buf)?;

        let mut cursor = 0;
        let topic = read_utf8_string(&mut cursor, body)?;
        let packet_id = if qos != QoS::AtMostOnce {
            Some(read_u16(&mut cursor, body)?)
        } else {
            None
        };

        Ok(Publish {
            topic,
            qos,
            retain: (flags & 0x01) != 0,
            dup: (flags & 0x08) != 0,
            payload: &body[cursor..],
            packet_id,
        })
    }
}

impl EncodePacket for Publish<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        let mut first_byte = 0x30 | ((self.qos as u8) << 1);
        if self.retain {
            first_byte |= 0x01;
        }
        if self.dup {
            first_byte |= 0x08;
        }

        encode_with_header(buf, first_byte, |cursor, buf| {
            write_utf8_string(cursor, buf, self.topic)?;
            // Packet ID (only for QoS > 0)
            if self.qos != QoS::AtMostOnce {
                let id = self.packet_id.ok_or(ProtocolError::MalformedPacket)?;
                write_u16(cursor, buf, id)?;
            }
            util::write_bytes(cursor, buf, self.payload)
        })
    }
}

// --- PUBACK / PUBREC / PUBREL / PUBCOMP ---

/// The two-byte acknowledgement packets of the QoS 1/2 flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    PubAck(u16),
    PubRec(u16),
    PubRel(u16),
    PubComp(u16),
}

impl EncodePacket for Ack {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        let (first_byte, packet_id) = match *self {
            Ack::PubAck(id) => (0x40, id),
            Ack::PubRec(id) => (0x50, id),
            Ack::PubRel(id) => (0x62, id),
            Ack::PubComp(id) => (0x70, id),
        };
        let mut cursor = 0;
        write_u8(&mut cursor, buf, first_byte)?;
        write_u8(&mut cursor, buf, 2)?;
        write_u16(&mut cursor, buf, packet_id)?;
        Ok(cursor)
    }
}

// --- SUBSCRIBE Packet ---
#[derive(Debug)]
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub topics: Vec<(&'a str, QoS), MAX_FILTERS>,
}

impl<'a> Subscribe<'a> {
    /// Creates a new Subscribe packet with a single topic.
    pub fn new(packet_id: u16, topic: &'a str, qos: QoS) -> Self {
        let mut topics = Vec::new();
        let _ = topics.push((topic, qos));
        Self { packet_id, topics }
    }
}

impl EncodePacket for Subscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        // Fixed header: SUBSCRIBE packet type (8) with reserved bits (0x02)
        encode_with_header(buf, 0x82, |cursor, buf| {
            write_u16(cursor, buf, self.packet_id)?;
            for (topic, qos) in &self.topics {
                write_utf8_string(cursor, buf, topic)?;
                write_u8(cursor, buf, *qos as u8)?;
            }
            Ok(())
        })
    }
}

// --- SUBACK Packet ---
#[derive(Debug)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<u8, MAX_FILTERS>,
}

impl SubAck {
    /// `0x80` in any slot means the broker refused that filter.
    pub fn is_failure(&self) -> bool {
        self.return_codes.iter().any(|code| *code == 0x80)
    }
}

impl<'a> DecodePacket<'a> for SubAck {
    fn decode(buf: &'a [u8]) -> Result<Self, PacketError> {
        let body = packet_body(buf)?;
        let mut cursor = 0;
        let packet_id = read_u16(&mut cursor, body)?;

        let mut return_codes = Vec::new();
        for code in &body[cursor..] {
            return_codes
                .push(*code)
                .map_err(|_| ProtocolError::MalformedPacket)?;
        }

        Ok(SubAck {
            packet_id,
            return_codes,
        })
    }
}

// --- UNSUBSCRIBE Packet ---
#[derive(Debug)]
pub struct Unsubscribe<'a> {
    pub packet_id: u16,
    pub topics: Vec<&'a str, MAX_FILTERS>,
}

impl<'a> Unsubscribe<'a> {
    pub fn new(packet_id: u16, topic: &'a str) -> Self {
        let mut topics = Vec::new();
        let _ = topics.push(topic);
        Self { packet_id, topics }
    }
}

impl EncodePacket for Unsubscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        encode_with_header(buf, 0xA2, |cursor, buf| {
            write_u16(cursor, buf, self.packet_id)?;
            for topic in &self.topics {
                write_utf8_string(cursor, buf, topic)?;
            }
            Ok(())
        })
    }
}

// --- PINGREQ Packet ---
#[derive(Debug)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        if buf.len() < 2 {
            return Err(PacketError::BufferTooSmall);
        }
        buf[0] = 0xC0;
        buf[1] = 0x00;
        Ok(2)
    }
}

// --- DISCONNECT Packet ---
#[derive(Debug)]
pub struct Disconnect;

impl EncodePacket for Disconnect {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, PacketError> {
        if buf.len() < 2 {
            return Err(PacketError::BufferTooSmall);
        }
        buf[0] = 0xE0;
        buf[1] = 0x00;
        Ok(2)
    }
}
