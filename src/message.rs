//! Outbound application messages.

use crate::config::MAX_TOPIC_LEN;
use crate::packet::QoS;

/// A message to publish. Borrowed and short-lived: it exists for the duration
/// of one [`publish_message`](crate::ClientManager::publish_message) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retained: bool,
    /// Caller-chosen packet id. Backends that manage ids themselves ignore it.
    pub message_id: Option<u16>,
}

impl<'a> Message<'a> {
    pub fn new(topic: &'a str, payload: &'a [u8], qos: QoS, retained: bool) -> Self {
        Self {
            topic,
            payload,
            qos,
            retained,
            message_id: None,
        }
    }

    pub fn with_message_id(mut self, id: u16) -> Self {
        self.message_id = Some(id);
        self
    }
}

/// Why a topic was refused before reaching a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TopicError {
    Empty,
    TooLong,
}

impl TopicError {
    pub const fn as_str(self) -> &'static str {
        match self {
            TopicError::Empty => "Topic is empty",
            TopicError::TooLong => "Topic is too long",
        }
    }
}

/// Checks the bounds every topic or topic filter must respect.
pub fn validate_topic(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(TopicError::TooLong);
    }
    Ok(())
}
