//! # MQTT Serialization Utilities
//!
//! Helpers for reading and writing MQTT-specific data types from and to byte
//! buffers: variable-byte integers, length-prefixed strings and big-endian
//! words. Every writer checks bounds and reports `BufferTooSmall` instead of
//! panicking, and every reader reports `MalformedPacket` on truncation.

use crate::error::{PacketError, ProtocolError};

/// Largest value a four-byte variable-byte integer can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Reads a variable-byte integer from the buffer, advancing the cursor.
///
/// This is the encoding MQTT uses for the remaining length of a packet.
pub fn read_variable_byte_integer(cursor: &mut usize, buf: &[u8]) -> Result<usize, PacketError> {
    let mut multiplier = 1;
    let mut value = 0;
    let mut i = 0;
    loop {
        let encoded_byte = buf
            .get(*cursor + i)
            .ok_or(ProtocolError::MalformedPacket)?;
        value += (encoded_byte & 127) as usize * multiplier;
        if (encoded_byte & 128) == 0 {
            break;
        }
        multiplier *= 128;
        i += 1;
        if i >= 4 {
            return Err(ProtocolError::MalformedPacket.into());
        }
    }
    *cursor += i + 1;
    Ok(value)
}

/// Decodes a variable-byte integer from the start of `buf`.
///
/// Returns `Ok(None)` when `buf` ends before the last length byte, which lets
/// a reader pull the fixed header from a stream one byte at a time.
pub fn decode_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>, PacketError> {
    let mut multiplier = 1;
    let mut value = 0;
    for (i, byte) in buf.iter().enumerate() {
        if i >= 4 {
            return Err(ProtocolError::MalformedPacket.into());
        }
        value += (byte & 127) as usize * multiplier;
        if (byte & 128) == 0 {
            return Ok(Some((value, i + 1)));
        }
        multiplier *= 128;
    }
    if buf.len() >= 4 {
        return Err(ProtocolError::MalformedPacket.into());
    }
    Ok(None)
}

/// Writes a variable-byte integer to the start of `buf`, returning the byte count.
pub fn write_variable_byte_integer_len(buf: &mut [u8], mut val: usize) -> Result<usize, PacketError> {
    if val > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::PayloadTooLarge.into());
    }
    let mut i = 0;
    loop {
        let mut encoded_byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            encoded_byte |= 128;
        }
        *buf.get_mut(i).ok_or(PacketError::BufferTooSmall)? = encoded_byte;
        i += 1;
        if val == 0 {
            break;
        }
    }
    Ok(i)
}

/// Reads a big-endian `u16`, advancing the cursor.
pub fn read_u16(cursor: &mut usize, buf: &[u8]) -> Result<u16, PacketError> {
    let bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(ProtocolError::MalformedPacket)?;
    *cursor += 2;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a UTF-8 encoded string (prefixed with a 2-byte length) from the buffer.
pub fn read_utf8_string<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a str, PacketError> {
    let len = read_u16(cursor, buf)? as usize;
    let bytes = buf
        .get(*cursor..*cursor + len)
        .ok_or(ProtocolError::MalformedPacket)?;
    let s = core::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8String)?;
    *cursor += len;
    Ok(s)
}

/// Writes one byte at the cursor, advancing it.
pub fn write_u8(cursor: &mut usize, buf: &mut [u8], val: u8) -> Result<(), PacketError> {
    *buf.get_mut(*cursor).ok_or(PacketError::BufferTooSmall)? = val;
    *cursor += 1;
    Ok(())
}

/// Writes a big-endian `u16` at the cursor, advancing it.
pub fn write_u16(cursor: &mut usize, buf: &mut [u8], val: u16) -> Result<(), PacketError> {
    write_bytes(cursor, buf, &val.to_be_bytes())
}

/// Copies raw bytes at the cursor, advancing it.
pub fn write_bytes(cursor: &mut usize, buf: &mut [u8], bytes: &[u8]) -> Result<(), PacketError> {
    let slice = buf
        .get_mut(*cursor..*cursor + bytes.len())
        .ok_or(PacketError::BufferTooSmall)?;
    slice.copy_from_slice(bytes);
    *cursor += bytes.len();
    Ok(())
}

/// Writes length-prefixed binary data (strings, will payloads, passwords).
pub fn write_binary(cursor: &mut usize, buf: &mut [u8], bytes: &[u8]) -> Result<(), PacketError> {
    let len = u16::try_from(bytes.len()).map_err(|_| ProtocolError::PayloadTooLarge)?;
    write_u16(cursor, buf, len)?;
    write_bytes(cursor, buf, bytes)
}

/// Writes a UTF-8 encoded string (prefixed with a 2-byte length) at the cursor.
pub fn write_utf8_string(cursor: &mut usize, buf: &mut [u8], s: &str) -> Result<(), PacketError> {
    write_binary(cursor, buf, s.as_bytes())
}

/// Copies `s` into a bounded string, cutting it at the last character
/// boundary that fits.
pub fn truncated<const N: usize>(s: &str) -> heapless::String<N> {
    let mut end = s.len().min(N);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = heapless::String::new();
    // `end` never exceeds N bytes, so this cannot overflow.
    let _ = out.push_str(&s[..end]);
    out
}
