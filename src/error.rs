//! # Error Types
//!
//! Error handling for the probe protocol.
//!
//! Every failure in the codec, the crypto utilities and the UDP transport is a
//! variant of [`ProtocolError`]. None of them is retried inside the crate: a
//! datagram that fails to decode is dropped by the caller, a construction that
//! fails is fatal to that call.
//!
//! ## Error Categories
//! - **Construction**: `InvalidArgument` for structurally invalid packets
//! - **Wire format**: `MalformedPacket` for undecodable datagrams,
//!   `EncodingOverflow` for data segments that do not fit a LONG payload
//! - **Cryptographic**: `CryptoFormat` for unparseable keys or signatures,
//!   `Signing` and `KeyGeneration` for provider failures
//! - **Ambient**: I/O, timeouts, configuration and transport errors
//!
//! A signature that parses but does not match is *not* an error; see
//! [`crate::utils::crypto::verify`].
//!
//! ## Example Usage
//! ```rust
//! use timeprobe_protocol::core::decoder::decode;
//! use timeprobe_protocol::error::ProtocolError;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:4500".parse().unwrap();
//! match decode(&[0u8; 7], addr, addr) {
//!     Err(ProtocolError::MalformedPacket(reason)) => println!("dropped: {reason}"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Construction errors
    pub const ERR_NEGATIVE_TIMESTAMP: &str = "Timestamp does not fit a signed 64-bit value";
    pub const ERR_NEGATIVE_IDENTIFIER: &str = "Identifier does not fit a signed 64-bit value";
    pub const ERR_PUBLIC_KEY_LENGTH: &str = "Public key has the wrong encoded length";
    pub const ERR_EMPTY_MESSAGE: &str = "Message must not be empty";
    pub const ERR_DATA_ON_SHORT: &str = "Data packets are always LONG";
    pub const ERR_NOT_DATA_PACKET: &str = "Packet carries no data segment";

    /// Decoder errors
    pub const ERR_PAYLOAD_LENGTH: &str = "Payload length matches neither SHORT nor LONG";
    pub const ERR_DELIMITER: &str = "Malformed data packet: delimiter mismatch";
    pub const ERR_MISSING_DELIMITER: &str = "Malformed data packet: message delimiter not found";
    pub const ERR_TRUNCATED: &str = "Malformed data packet: field runs past the payload";
    pub const ERR_BASE64: &str = "Malformed data packet: message is not valid base64";
    pub const ERR_REPORT_LENGTH: &str = "Report batch length is not a multiple of the row size";

    /// Cryptographic errors
    pub const ERR_PUBLIC_KEY_DECODE: &str = "Public key is not a valid RSA SubjectPublicKeyInfo";
    pub const ERR_PUBLIC_KEY_SIZE: &str = "Public key modulus has the wrong size";
    pub const ERR_SIGNATURE_LENGTH: &str = "Signature has the wrong length";

    /// Transport errors
    pub const ERR_SHORT_WRITE: &str = "Socket accepted only part of the datagram";
    pub const ERR_CHANNEL_CLOSED: &str = "Data channel receiver dropped";
}

// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Data segment needs {required} bytes but the LONG budget is {budget}")]
    EncodingOverflow { required: usize, budget: usize },

    #[error("Crypto format error: {0}")]
    CryptoFormat(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Whether this error means the inbound datagram should be dropped and
    /// the receive loop continued.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ProtocolError::MalformedPacket(_))
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
