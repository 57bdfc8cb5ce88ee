#![no_main]

use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;
use stnet::core::frame::{split_record, Unmarshaled};
use stnet::core::sdp;
use stnet::protocol::rpc::{RequestPacket, ResponsePacket};
use stnet::sdp_record;

sdp_record! {
    #[derive(Debug, Default)]
    struct Nested {
        id: u64,
        names: Vec<String>,
        children: Vec<Nested>,
        scores: HashMap<String, f64>,
    }
}

fuzz_target!(|data: &[u8]| {
    // decode must fail cleanly on any input: no panics, no unbounded recursion
    let _ = sdp::decode::<Nested>(data);
    let _ = sdp::decode::<RequestPacket>(data);
    if let Unmarshaled::Message { len, .. } = split_record::<ResponsePacket>(data, 1 << 20) {
        assert!(len <= data.len());
    }
});
