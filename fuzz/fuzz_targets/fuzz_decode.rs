#![no_main]

use libfuzzer_sys::fuzz_target;
use std::net::{Ipv4Addr, SocketAddr};
use timeprobe_protocol::{decode, encode};

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary datagrams must never panic
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 4500));
    if let Ok(packet) = decode(data, addr, addr) {
        // Anything that decodes re-encodes to the same size class
        if let Ok(bytes) = encode(&packet) {
            assert_eq!(bytes.len(), data.len());
        }
    }
});
