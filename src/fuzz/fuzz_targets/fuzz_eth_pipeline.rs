//! Pipeline fuzzer
//!
//! Feeds arbitrary bytes through the full Ethernet pipeline with a
//! pass-through observer, looking for panics or out-of-bounds access in
//! the decoders and the descent logic. Errors are expected; crashes are
//! not.
//!
//! Run with: cargo +nightly fuzz run fuzz_eth_pipeline

#![no_main]

use libfuzzer_sys::fuzz_target;
use upf_core::BufferWritableView;
use upf_net::processor::{self, PacketObserver};
use upf_net::UserData;

struct PassThrough;
impl PacketObserver for PassThrough {}

fuzz_target!(|data: &[u8]| {
    let view = BufferWritableView::from_vec(data.to_vec()).as_view();
    let _ = processor::process_eth_packet(&mut PassThrough, &view, UserData::default());
    let _ = processor::process_ipv4_packet(&mut PassThrough, &view, UserData::default());
});
