//! Fuzz target for the packet framer's decode side.
//!
//! Exercises `deserialize_stream` and `deserialize_datagram` against
//! arbitrary bytes. Both must reject malformed SOH/EOT framing, truncated
//! headers, bogus compression-mode bytes, and corrupt zlib payloads with an
//! `Err`, never a panic.

#![no_main]

use bcap_proto::{deserialize_datagram, deserialize_stream};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = deserialize_stream(data);
    let _ = deserialize_datagram(data);
});
