//! # Transport Layer
//!
//! Datagram delivery for the probe protocol.
//!
//! The codec in [`crate::core`] is transport-agnostic; this module supplies
//! the default UDP implementation of the collaborator it expects: something
//! that hands over each inbound payload with its sender and recipient, and
//! sends an outbound payload to a destination.
//!
//! ## Components
//! - **UdpTransport**: tokio socket wrapper that encodes and decodes packets
//! - **Reflector**: server loop answering probes and ingesting uploads
//! - **probe / send_data**: client side of a single round trip

pub mod udp;
