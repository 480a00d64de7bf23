//! Packet to payload serialization.
//!
//! Encoding is a pure function of the packet: no I/O, no shared state. The
//! only nondeterminism is the random filler that pads LONG payloads.

use crate::core::packet::{DataFields, Packet, PacketKind};
use crate::core::packet_type::{PacketType, TIMESTAMPS_BYTES, WORD_BYTES};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::crypto::{PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};
use rand::RngCore;
use tracing::{debug, trace};

/// Tag announcing a data segment after the timestamps.
pub const DATA_HEADER: &[u8; 4] = b"DATA";

/// Separator between the fields of a data segment.
pub const DATA_DELIMITER: &[u8; 2] = b";;";

/// Fixed bytes of a data segment, i.e. everything except the base64 message
/// and the signature.
const DATA_SEGMENT_OVERHEAD: usize =
    DATA_HEADER.len() + 5 * DATA_DELIMITER.len() + 2 * WORD_BYTES + PUBLIC_KEY_LENGTH;

/// Largest base64 text, in bytes, that fits a LONG payload next to a
/// signature of `signature_len` bytes.
pub const fn max_encoded_message_len(signature_len: usize) -> usize {
    PacketType::Long
        .size()
        .saturating_sub(TIMESTAMPS_BYTES + DATA_SEGMENT_OVERHEAD + signature_len)
}

/// Largest raw message that fits a LONG payload with a standard-length
/// signature.
pub const MAX_MESSAGE_LENGTH: usize =
    max_encoded_message_len(SIGNATURE_LENGTH) / 4 * 3;

/// Serialize `packet` into a freshly allocated payload.
///
/// # Errors
/// Returns `ProtocolError::EncodingOverflow` if the data segment does not fit
/// the LONG budget.
pub fn encode(packet: &Packet) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(packet.packet_type().size());
    encode_into(packet, &mut buf)?;
    Ok(buf.freeze())
}

/// Serialize `packet` by appending to `buf`.
///
/// Nothing is written if the packet is rejected.
///
/// # Errors
/// Returns `ProtocolError::InvalidArgument` if the signature is not exactly
/// [`SIGNATURE_LENGTH`] bytes, and `ProtocolError::EncodingOverflow` if the
/// data segment does not fit the LONG budget.
pub fn encode_into(packet: &Packet, buf: &mut BytesMut) -> Result<()> {
    let target = packet.packet_type().size();

    // Size the data segment before touching the buffer
    let encoded_message = match packet.kind() {
        PacketKind::Data(data) => {
            // The decoder reads a fixed-width signature; anything else would misframe
            if data.signature().len() != SIGNATURE_LENGTH {
                debug!(
                    len = data.signature().len(),
                    "Rejecting data packet with a signature of the wrong width"
                );
                return Err(ProtocolError::InvalidArgument(format!(
                    "{} ({} bytes, expected {SIGNATURE_LENGTH})",
                    constants::ERR_SIGNATURE_LENGTH,
                    data.signature().len()
                )));
            }
            let text = STANDARD.encode(data.message());
            let required =
                TIMESTAMPS_BYTES + DATA_SEGMENT_OVERHEAD + text.len() + data.signature().len();
            if required > target {
                debug!(required, budget = target, "Rejecting oversized data packet");
                return Err(ProtocolError::EncodingOverflow {
                    required,
                    budget: target,
                });
            }
            Some(text)
        }
        PacketKind::Probe => None,
    };

    let start = buf.len();
    buf.reserve(target);
    for timestamp in packet.timestamps() {
        buf.put_u64(timestamp);
    }

    if let (PacketKind::Data(data), Some(text)) = (packet.kind(), encoded_message) {
        put_data_segment(buf, data, text.as_bytes());
    }

    if packet.packet_type() == PacketType::Long {
        let written = buf.len() - start;
        let filler = target - written;
        let mut padding = vec![0u8; filler];
        rand::rng().fill_bytes(&mut padding);
        buf.put_slice(&padding);
        trace!(filler, "Padded LONG payload");
    }

    Ok(())
}

fn put_data_segment(buf: &mut BytesMut, data: &DataFields, encoded_message: &[u8]) {
    buf.put_slice(DATA_HEADER);
    buf.put_slice(DATA_DELIMITER);
    buf.put_u64(data.user_id());
    buf.put_u64(data.installation_id());
    buf.put_slice(DATA_DELIMITER);
    for field in [data.public_key(), encoded_message, data.signature()] {
        buf.put_slice(field);
        buf.put_slice(DATA_DELIMITER);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::net::SocketAddr;

    fn addr() -> SocketAddr {
        "127.0.0.1:4500".parse().unwrap()
    }

    fn data_packet(message: Vec<u8>) -> Packet {
        let fields = DataFields::new(
            3,
            4,
            vec![0xAA; PUBLIC_KEY_LENGTH],
            message,
            vec![0xBB; SIGNATURE_LENGTH],
        )
        .unwrap();
        Packet::data(addr(), addr(), 1, fields).build().unwrap()
    }

    #[test]
    fn test_short_layout() {
        let packet = Packet::probe(PacketType::Short, addr(), addr(), 1000)
            .build()
            .unwrap();
        let bytes = encode(&packet).unwrap();
        let mut expected = [0u8; 32];
        expected[6] = 0x03;
        expected[7] = 0xE8;
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_long_probe_is_padded() {
        let packet = Packet::probe(PacketType::Long, addr(), addr(), 1)
            .build()
            .unwrap();
        assert_eq!(encode(&packet).unwrap().len(), 4448);
    }

    #[test]
    fn test_data_segment_layout() {
        let bytes = encode(&data_packet(b"hello".to_vec())).unwrap();
        assert_eq!(bytes.len(), 4448);
        assert_eq!(&bytes[32..36], b"DATA");
        assert_eq!(&bytes[36..38], b";;");
        assert_eq!(&bytes[38..46], &3u64.to_be_bytes());
        assert_eq!(&bytes[46..54], &4u64.to_be_bytes());
        assert_eq!(&bytes[54..56], b";;");
        assert!(bytes[56..56 + PUBLIC_KEY_LENGTH].iter().all(|b| *b == 0xAA));
        let message_at = 56 + PUBLIC_KEY_LENGTH + 2;
        assert_eq!(&bytes[message_at..message_at + 8], b"aGVsbG8=");
        assert_eq!(&bytes[message_at + 8..message_at + 10], b";;");
        let signature_at = message_at + 10;
        assert!(bytes[signature_at..signature_at + SIGNATURE_LENGTH]
            .iter()
            .all(|b| *b == 0xBB));
        assert_eq!(
            &bytes[signature_at + SIGNATURE_LENGTH..signature_at + SIGNATURE_LENGTH + 2],
            b";;"
        );
    }

    #[test]
    fn test_largest_message_fits() {
        let packet = data_packet(vec![0x5A; MAX_MESSAGE_LENGTH]);
        assert_eq!(encode(&packet).unwrap().len(), 4448);
    }

    #[test]
    fn test_oversized_message_rejected_without_writing() {
        let packet = data_packet(vec![0x5A; MAX_MESSAGE_LENGTH + 1]);
        let mut buf = BytesMut::new();
        let err = encode_into(&packet, &mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::EncodingOverflow { budget: 4448, .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_signature_width_enforced_without_writing() {
        let addr = addr();
        for len in [0usize, 255, 257] {
            let fields = DataFields::new(
                3,
                4,
                vec![0xAA; PUBLIC_KEY_LENGTH],
                b"m".to_vec(),
                vec![0xBB; len],
            )
            .unwrap();
            let packet = Packet::data(addr, addr, 1, fields).build().unwrap();
            let mut buf = BytesMut::new();
            let err = encode_into(&packet, &mut buf).unwrap_err();
            assert!(matches!(err, ProtocolError::InvalidArgument(_)), "length {len}");
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_encode_into_appends() {
        let packet = Packet::probe(PacketType::Short, addr(), addr(), 1)
            .build()
            .unwrap();
        let mut buf = BytesMut::from(&b"xx"[..]);
        encode_into(&packet, &mut buf).unwrap();
        assert_eq!(buf.len(), 34);
    }
}
