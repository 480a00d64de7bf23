//! Measurement rows carried in a data packet's message.
//!
//! A client keeps the timestamps of its recent round trips and uploads them as
//! one signed batch. Each row is the four timestamps of one round trip, packed
//! as big-endian words exactly like the head of a probe payload.

use crate::core::packet::Packet;
use crate::core::packet_type::TIMESTAMPS_BYTES;
use crate::error::{constants, ProtocolError, Result};
use bytes::{Buf, BufMut};

/// Timestamps of one completed round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Report {
    pub initial_timestamp: u64,
    pub reception_timestamp: u64,
    pub sent_timestamp: u64,
    pub final_timestamp: u64,
}

impl From<&Packet> for Report {
    fn from(packet: &Packet) -> Self {
        let [initial_timestamp, reception_timestamp, sent_timestamp, final_timestamp] =
            packet.timestamps();
        Self {
            initial_timestamp,
            reception_timestamp,
            sent_timestamp,
            final_timestamp,
        }
    }
}

/// Pack rows into a message body.
pub fn encode_reports(reports: &[Report]) -> Vec<u8> {
    let mut out = Vec::with_capacity(reports.len() * TIMESTAMPS_BYTES);
    for report in reports {
        out.put_u64(report.initial_timestamp);
        out.put_u64(report.reception_timestamp);
        out.put_u64(report.sent_timestamp);
        out.put_u64(report.final_timestamp);
    }
    out
}

/// Unpack a message body into rows.
///
/// # Errors
/// Returns `ProtocolError::MalformedPacket` if the body is not a whole number
/// of rows.
pub fn decode_reports(mut message: &[u8]) -> Result<Vec<Report>> {
    if message.len() % TIMESTAMPS_BYTES != 0 {
        return Err(ProtocolError::MalformedPacket(format!(
            "{} ({} bytes)",
            constants::ERR_REPORT_LENGTH,
            message.len()
        )));
    }
    let mut reports = Vec::with_capacity(message.len() / TIMESTAMPS_BYTES);
    while message.has_remaining() {
        reports.push(Report {
            initial_timestamp: message.get_u64(),
            reception_timestamp: message.get_u64(),
            sent_timestamp: message.get_u64(),
            final_timestamp: message.get_u64(),
        });
    }
    Ok(reports)
}
