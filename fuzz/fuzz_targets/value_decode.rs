//! Fuzz target for `decode_value_bytes`.
//!
//! This fuzzer feeds arbitrary byte sequences directly into the VARIANT
//! value decoder, bypassing the packet framer, to look for:
//! - panics on truncated or self-referential array/variant-array counts
//! - integer overflow when a declared element count is used as a loop bound
//! - buffer over-reads in scalar or BSTR payload decoding
//!
//! The decoder should never panic; every malformed input must return `Err`.

#![no_main]

use bcap_proto::decode_value_bytes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode_value_bytes(data);
});
