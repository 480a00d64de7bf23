//! # Core Protocol Components
//!
//! Packet model and the datagram codec.
//!
//! This module provides the foundation for the protocol: the two wire size
//! classes, the immutable packet value, and the pure encode/decode functions
//! that translate between packets and UDP payloads.
//!
//! ## Components
//! - **PacketType**: SHORT (32 bytes) and LONG (4448 bytes) size classes
//! - **Packet**: timestamps plus an optional authenticated data segment
//! - **Encoder / Decoder**: fixed-size payload serialization
//! - **Report**: the measurement rows carried inside a data message
//!
//! ## Wire Format
//! ```text
//! SHORT: [initial(8)] [reception(8)] [sent(8)] [final(8)]
//! LONG:  [timestamps(32)] ["DATA;;" uid(8) iid(8) ";;" key(294) ";;" b64(msg) ";;" sig(256) ";;"] [filler]
//! ```
//!
//! ## Security
//! - Payload length is checked before any field is read
//! - Every delimiter in the data segment is validated
//! - Filler bytes are random and never interpreted

pub mod decoder;
pub mod encoder;
pub mod packet;
pub mod packet_type;
pub mod report;
