//! Payload to packet parsing.
//!
//! ```text
//! ReadTimestamps -> ClassifyPayload -> ParseDataFields -> DataPacket
//!                                   \-> Done           -> Packet
//! any step                          --> MalformedPacket
//! ```
//!
//! The decoder never retries and never guesses: one bad delimiter anywhere in
//! the data segment rejects the whole datagram.

use crate::core::encoder::{DATA_DELIMITER, DATA_HEADER};
use crate::core::packet::{DataFields, Packet, PacketBuilder};
use crate::core::packet_type::PacketType;
use crate::error::{constants, ProtocolError, Result};
use crate::utils::crypto::{PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Buf;
use std::net::SocketAddr;
use tracing::{debug, trace};

/// Parse one inbound datagram.
///
/// `from` and `to` are the sender and recipient the transport observed; they
/// are attached to the packet, never read from the payload.
///
/// # Errors
/// Returns `ProtocolError::MalformedPacket` if the length matches no size
/// class or the data segment is not well formed.
pub fn decode(payload: &[u8], from: SocketAddr, to: SocketAddr) -> Result<Packet> {
    let packet_type = PacketType::from_payload_len(payload.len())?;
    let mut cursor = payload;

    let initial = cursor.get_u64();
    let reception = cursor.get_u64();
    let sent = cursor.get_u64();
    let final_ = cursor.get_u64();

    let builder = if packet_type == PacketType::Long && has_data_header(cursor) {
        cursor.advance(DATA_HEADER.len() + DATA_DELIMITER.len());
        let data = read_data_fields(&mut cursor)?;
        trace!(
            user_id = data.user_id(),
            message_len = data.message().len(),
            "Decoded data segment"
        );
        Packet::data(from, to, initial, data)
    } else {
        Packet::probe(packet_type, from, to, initial)
    };

    finish(builder, reception, sent, final_)
}

fn finish(builder: PacketBuilder, reception: u64, sent: u64, final_: u64) -> Result<Packet> {
    builder
        .reception_timestamp(reception)
        .sent_timestamp(sent)
        .final_timestamp(final_)
        .build()
        .map_err(into_malformed)
}

/// Peek for `"DATA;;"` without consuming.
#[inline]
fn has_data_header(cursor: &[u8]) -> bool {
    let header_len = DATA_HEADER.len();
    cursor.len() >= header_len + DATA_DELIMITER.len()
        && &cursor[..header_len] == DATA_HEADER
        && &cursor[header_len..header_len + DATA_DELIMITER.len()] == DATA_DELIMITER
}

fn read_data_fields(cursor: &mut &[u8]) -> Result<DataFields> {
    let user_id = read_u64(cursor)?;
    let installation_id = read_u64(cursor)?;
    expect_delimiter(cursor)?;

    let public_key = read_exact(cursor, PUBLIC_KEY_LENGTH)?;
    expect_delimiter(cursor)?;

    // base64 never contains ';', so the first one ends the message text
    let text_len = cursor
        .iter()
        .position(|b| *b == DATA_DELIMITER[0])
        .ok_or_else(|| ProtocolError::MalformedPacket(constants::ERR_MISSING_DELIMITER.into()))?;
    let text = read_exact(cursor, text_len)?;
    let message = STANDARD.decode(&text).map_err(|e| {
        debug!(error = %e, "Rejecting data packet with invalid base64");
        ProtocolError::MalformedPacket(format!("{}: {e}", constants::ERR_BASE64))
    })?;
    expect_delimiter(cursor)?;

    let signature = read_exact(cursor, SIGNATURE_LENGTH)?;
    expect_delimiter(cursor)?;

    // The rest is filler
    DataFields::new(user_id, installation_id, public_key, message, signature)
        .map_err(into_malformed)
}

fn read_u64(cursor: &mut &[u8]) -> Result<u64> {
    if cursor.remaining() < std::mem::size_of::<u64>() {
        return Err(ProtocolError::MalformedPacket(constants::ERR_TRUNCATED.into()));
    }
    Ok(cursor.get_u64())
}

fn read_exact(cursor: &mut &[u8], len: usize) -> Result<Vec<u8>> {
    if cursor.remaining() < len {
        return Err(ProtocolError::MalformedPacket(constants::ERR_TRUNCATED.into()));
    }
    let (field, rest) = cursor.split_at(len);
    let field = field.to_vec();
    *cursor = rest;
    Ok(field)
}

fn expect_delimiter(cursor: &mut &[u8]) -> Result<()> {
    let delimiter = read_exact(cursor, DATA_DELIMITER.len())?;
    if delimiter.as_slice() != DATA_DELIMITER {
        debug!(found = ?delimiter, "Delimiter mismatch in data segment");
        return Err(ProtocolError::MalformedPacket(constants::ERR_DELIMITER.into()));
    }
    Ok(())
}

/// A structurally invalid packet read off the wire is a wire problem, not a
/// caller mistake.
fn into_malformed(err: ProtocolError) -> ProtocolError {
    match err {
        ProtocolError::InvalidArgument(reason) => ProtocolError::MalformedPacket(reason),
        other => other,
    }
}
