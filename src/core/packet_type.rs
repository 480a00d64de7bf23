//! Wire size classes.
//!
//! Every datagram of the protocol is exactly one of two sizes. The size alone
//! tells the decoder which class it is looking at.

use crate::error::{constants, ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes taken by one big-endian timestamp or identifier on the wire.
pub const WORD_BYTES: usize = std::mem::size_of::<u64>();

/// Bytes taken by the four timestamps that open every payload.
pub const TIMESTAMPS_BYTES: usize = 4 * WORD_BYTES;

/// Fixed budget of a LONG payload beyond its six words.
pub const LONG_DATA_BUDGET: usize = 4400;

/// Size class of a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PacketType {
    /// Four timestamps only.
    #[default]
    Short,
    /// Four timestamps followed by an optional data segment and random filler.
    Long,
}

impl PacketType {
    /// On-wire payload size in bytes.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            PacketType::Short => TIMESTAMPS_BYTES,
            PacketType::Long => 6 * WORD_BYTES + LONG_DATA_BUDGET,
        }
    }

    /// Classify an inbound payload by its length.
    ///
    /// # Errors
    /// Returns `ProtocolError::MalformedPacket` when the length matches
    /// neither class.
    pub fn from_payload_len(len: usize) -> Result<Self> {
        if len == PacketType::Short.size() {
            Ok(PacketType::Short)
        } else if len == PacketType::Long.size() {
            Ok(PacketType::Long)
        } else {
            Err(ProtocolError::MalformedPacket(format!(
                "{} ({len} bytes)",
                constants::ERR_PAYLOAD_LENGTH
            )))
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketType::Short => "SHORT",
            PacketType::Long => "LONG",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
