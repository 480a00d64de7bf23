//! # timeprobe-protocol
//!
//! A compact UDP protocol for time-synchronization probes, with an
//! authenticated channel for uploading a client's measurement log.
//!
//! A client stamps a probe with the nanoseconds elapsed since local midnight
//! and sends it; the server stamps reception and send times and returns it;
//! the client stamps the arrival. The four timestamps travel in every
//! datagram. LONG datagrams may also carry a data segment: a batch of past
//! measurements signed with the client's RSA key.
//!
//! ## Layout
//! - [`core`]: packet model, encoder and decoder
//! - [`utils`]: crypto, clock, logging, metrics
//! - [`transport`]: tokio UDP transport, reflector loop and client round trip
//! - [`config`]: TOML / environment configuration
//! - [`error`]: the crate-wide error type
//!
//! ## Example
//! ```rust
//! use timeprobe_protocol::{decode, encode, Packet, PacketType};
//!
//! let client = "192.0.2.1:40000".parse().unwrap();
//! let server = "192.0.2.2:4500".parse().unwrap();
//! let probe = Packet::probe(PacketType::Short, client, server, 1_000).build()?;
//!
//! let payload = encode(&probe)?;
//! assert_eq!(payload.len(), 32);
//! assert_eq!(decode(&payload, client, server)?, probe);
//! # Ok::<(), timeprobe_protocol::ProtocolError>(())
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod transport;
pub mod utils;

pub use crate::core::decoder::decode;
pub use crate::core::encoder::{encode, encode_into};
pub use crate::core::packet::{DataFields, Packet, PacketBuilder, PacketKind};
pub use crate::core::packet_type::PacketType;
pub use crate::error::{ProtocolError, Result};
