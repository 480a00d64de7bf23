//! Fixtures shared by the integration tests.

#![allow(dead_code, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::OnceLock;
use timeprobe_protocol::utils::crypto::{generate_key_pair, sign, KeyPair};
use timeprobe_protocol::{DataFields, Packet};

/// RSA-2048 generation is slow; every test in a binary shares one pair.
pub fn key_pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| generate_key_pair().expect("key generation"))
}

pub fn client_addr() -> SocketAddr {
    "8.8.8.8:4500".parse().expect("address")
}

pub fn server_addr() -> SocketAddr {
    "127.0.0.1:4500".parse().expect("address")
}

/// Data fields over `message`, signed with the shared key.
pub fn signed_fields(user_id: u64, installation_id: u64, message: &[u8]) -> DataFields {
    let pair = key_pair();
    DataFields::new(
        user_id,
        installation_id,
        pair.encoded_public_key().expect("encode key"),
        message.to_vec(),
        sign(message, pair).expect("sign"),
    )
    .expect("valid data fields")
}

pub fn signed_packet(message: &[u8]) -> Packet {
    Packet::data(client_addr(), server_addr(), 1_000, signed_fields(1, 1, message))
        .reception_timestamp(1_001)
        .sent_timestamp(1_002)
        .final_timestamp(1_003)
        .build()
        .expect("valid packet")
}
