#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use timeprobe_protocol::utils::crypto::{PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use timeprobe_protocol::utils::metrics::Metrics;
use timeprobe_protocol::{decode, encode, DataFields, Packet, PacketType};
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_encode_decode_heavy() {
    let iterations = 5_000u64;
    let message_sizes = [0usize, 1, 64, 512, 2877];
    let addr: SocketAddr = "127.0.0.1:4500".parse().unwrap();
    let metrics = Arc::new(Metrics::new());

    let mut tasks = JoinSet::new();
    for &size in &message_sizes {
        let metrics = metrics.clone();
        tasks.spawn(async move {
            for i in 0..iterations {
                let packet = if size == 0 {
                    Packet::probe(PacketType::Short, addr, addr, i).build().unwrap()
                } else {
                    let fields = DataFields::new(
                        i,
                        size as u64,
                        vec![(i & 0xFF) as u8; PUBLIC_KEY_LENGTH],
                        vec![((i as usize + size) & 0xFF) as u8; size],
                        vec![0u8; SIGNATURE_LENGTH],
                    )
                    .unwrap();
                    Packet::data(addr, addr, i, fields).build().unwrap()
                };
                let bytes = encode(&packet).unwrap();
                metrics.datagram_sent(bytes.len() as u64);
                let decoded = decode(&bytes, addr, addr).unwrap();
                assert_eq!(decoded, packet);
            }
        });
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.datagrams_sent, iterations * message_sizes.len() as u64);
    assert_eq!(
        snapshot.bytes_sent,
        iterations * (32 + 4 * 4448)
    );
}
