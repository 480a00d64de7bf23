//! Immutable packet values.
//!
//! A [`Packet`] carries the four round-trip timestamps of a probe, the
//! endpoints the transport associated with it, and a [`PacketKind`] telling
//! whether a signed data segment rides along. Packets are built once through
//! [`PacketBuilder`] and never mutated; the side that records a new observation
//! time derives a fresh packet with [`Packet::to_builder`].

use crate::core::packet_type::PacketType;
use crate::error::{constants, ProtocolError, Result};
use crate::utils::crypto::{self, PUBLIC_KEY_LENGTH};
use std::fmt;
use std::net::SocketAddr;

/// Largest value a timestamp or identifier may take. Peers read these fields
/// as signed 64-bit integers.
pub const MAX_WIRE_VALUE: u64 = i64::MAX as u64;

/// What a packet carries beyond its timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Timestamps only, SHORT or LONG.
    Probe,
    /// An authenticated measurement upload; always LONG.
    Data(DataFields),
}

/// The authenticated data segment of a LONG packet.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DataFields {
    user_id: u64,
    installation_id: u64,
    public_key: Vec<u8>,
    message: Vec<u8>,
    signature: Vec<u8>,
}

impl DataFields {
    /// Structural validation only; no cryptography happens here.
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidArgument` if an identifier exceeds
    /// [`MAX_WIRE_VALUE`], the key is not [`PUBLIC_KEY_LENGTH`] bytes, or the
    /// message is empty.
    pub fn new(
        user_id: u64,
        installation_id: u64,
        public_key: Vec<u8>,
        message: Vec<u8>,
        signature: Vec<u8>,
    ) -> Result<Self> {
        check_wire_value("user_id", user_id, constants::ERR_NEGATIVE_IDENTIFIER)?;
        check_wire_value(
            "installation_id",
            installation_id,
            constants::ERR_NEGATIVE_IDENTIFIER,
        )?;
        if public_key.len() != PUBLIC_KEY_LENGTH {
            return Err(ProtocolError::InvalidArgument(format!(
                "{} ({} bytes, expected {PUBLIC_KEY_LENGTH})",
                constants::ERR_PUBLIC_KEY_LENGTH,
                public_key.len()
            )));
        }
        if message.is_empty() {
            return Err(ProtocolError::InvalidArgument(
                constants::ERR_EMPTY_MESSAGE.to_string(),
            ));
        }
        Ok(Self {
            user_id,
            installation_id,
            public_key,
            message,
            signature,
        })
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn installation_id(&self) -> u64 {
        self.installation_id
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Check that `signature` authenticates `message` under `public_key`.
    ///
    /// # Errors
    /// Returns `ProtocolError::CryptoFormat` when the key or signature is not
    /// structurally usable. A forged but well-formed signature is `Ok(false)`.
    pub fn is_valid(&self) -> Result<bool> {
        crypto::verify(&self.message, &self.public_key, &self.signature)
    }
}

impl fmt::Debug for DataFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFields")
            .field("user_id", &self.user_id)
            .field("installation_id", &self.installation_id)
            .field("public_key_len", &self.public_key.len())
            .field("message_len", &self.message.len())
            .field("signature_len", &self.signature.len())
            .finish()
    }
}

/// One probe datagram.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    from: SocketAddr,
    to: SocketAddr,
    packet_type: PacketType,
    initial_timestamp: u64,
    reception_timestamp: u64,
    sent_timestamp: u64,
    final_timestamp: u64,
    kind: PacketKind,
}

impl Packet {
    /// Start a timestamp-only packet of the given size class.
    pub fn probe(
        packet_type: PacketType,
        from: SocketAddr,
        to: SocketAddr,
        initial_timestamp: u64,
    ) -> PacketBuilder {
        PacketBuilder {
            from,
            to,
            packet_type,
            initial_timestamp,
            reception_timestamp: 0,
            sent_timestamp: 0,
            final_timestamp: 0,
            kind: PacketKind::Probe,
        }
    }

    /// Start a LONG packet carrying `data`.
    pub fn data(
        from: SocketAddr,
        to: SocketAddr,
        initial_timestamp: u64,
        data: DataFields,
    ) -> PacketBuilder {
        PacketBuilder {
            from,
            to,
            packet_type: PacketType::Long,
            initial_timestamp,
            reception_timestamp: 0,
            sent_timestamp: 0,
            final_timestamp: 0,
            kind: PacketKind::Data(data),
        }
    }

    /// A builder pre-filled with every field of this packet.
    pub fn to_builder(&self) -> PacketBuilder {
        PacketBuilder {
            from: self.from,
            to: self.to,
            packet_type: self.packet_type,
            initial_timestamp: self.initial_timestamp,
            reception_timestamp: self.reception_timestamp,
            sent_timestamp: self.sent_timestamp,
            final_timestamp: self.final_timestamp,
            kind: self.kind.clone(),
        }
    }

    pub fn from(&self) -> SocketAddr {
        self.from
    }

    pub fn to(&self) -> SocketAddr {
        self.to
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn initial_timestamp(&self) -> u64 {
        self.initial_timestamp
    }

    pub fn reception_timestamp(&self) -> u64 {
        self.reception_timestamp
    }

    pub fn sent_timestamp(&self) -> u64 {
        self.sent_timestamp
    }

    pub fn final_timestamp(&self) -> u64 {
        self.final_timestamp
    }

    /// All four timestamps in wire order.
    pub fn timestamps(&self) -> [u64; 4] {
        [
            self.initial_timestamp,
            self.reception_timestamp,
            self.sent_timestamp,
            self.final_timestamp,
        ]
    }

    pub fn kind(&self) -> &PacketKind {
        &self.kind
    }

    /// The data segment, if this is a data packet.
    pub fn data_fields(&self) -> Option<&DataFields> {
        match &self.kind {
            PacketKind::Data(data) => Some(data),
            PacketKind::Probe => None,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self.kind, PacketKind::Data(_))
    }

    /// Authenticate the data segment.
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidArgument` on a probe, and
    /// `ProtocolError::CryptoFormat` as described on [`DataFields::is_valid`].
    pub fn is_valid(&self) -> Result<bool> {
        self.data_fields()
            .ok_or_else(|| ProtocolError::InvalidArgument(constants::ERR_NOT_DATA_PACKET.into()))?
            .is_valid()
    }
}

/// Collects the fields of a [`Packet`] and validates them once in
/// [`PacketBuilder::build`].
#[derive(Debug, Clone)]
#[must_use]
pub struct PacketBuilder {
    from: SocketAddr,
    to: SocketAddr,
    packet_type: PacketType,
    initial_timestamp: u64,
    reception_timestamp: u64,
    sent_timestamp: u64,
    final_timestamp: u64,
    kind: PacketKind,
}

impl PacketBuilder {
    pub fn reception_timestamp(mut self, timestamp: u64) -> Self {
        self.reception_timestamp = timestamp;
        self
    }

    pub fn sent_timestamp(mut self, timestamp: u64) -> Self {
        self.sent_timestamp = timestamp;
        self
    }

    pub fn final_timestamp(mut self, timestamp: u64) -> Self {
        self.final_timestamp = timestamp;
        self
    }

    /// Replace the endpoints, e.g. to address a reply to the original sender.
    pub fn endpoints(mut self, from: SocketAddr, to: SocketAddr) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Drop the data segment, keeping the size class.
    pub fn without_data(mut self) -> Self {
        self.kind = PacketKind::Probe;
        self
    }

    /// Validate and produce the packet.
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidArgument` if a timestamp exceeds
    /// [`MAX_WIRE_VALUE`] or a data packet is not LONG.
    pub fn build(self) -> Result<Packet> {
        check_wire_value(
            "initial_timestamp",
            self.initial_timestamp,
            constants::ERR_NEGATIVE_TIMESTAMP,
        )?;
        check_wire_value(
            "reception_timestamp",
            self.reception_timestamp,
            constants::ERR_NEGATIVE_TIMESTAMP,
        )?;
        check_wire_value(
            "sent_timestamp",
            self.sent_timestamp,
            constants::ERR_NEGATIVE_TIMESTAMP,
        )?;
        check_wire_value(
            "final_timestamp",
            self.final_timestamp,
            constants::ERR_NEGATIVE_TIMESTAMP,
        )?;
        if matches!(self.kind, PacketKind::Data(_)) && self.packet_type != PacketType::Long {
            return Err(ProtocolError::InvalidArgument(
                constants::ERR_DATA_ON_SHORT.to_string(),
            ));
        }

        Ok(Packet {
            from: self.from,
            to: self.to,
            packet_type: self.packet_type,
            initial_timestamp: self.initial_timestamp,
            reception_timestamp: self.reception_timestamp,
            sent_timestamp: self.sent_timestamp,
            final_timestamp: self.final_timestamp,
            kind: self.kind,
        })
    }
}

#[inline]
fn check_wire_value(field: &str, value: u64, reason: &str) -> Result<()> {
    if value > MAX_WIRE_VALUE {
        return Err(ProtocolError::InvalidArgument(format!(
            "{reason}: {field} = {value}"
        )));
    }
    Ok(())
}
