//! Wire codec for the b-CAP binary controller access protocol.
//!
//! This crate implements two layers, independent of any transport:
//!
//! - [`value`]: the VARIANT tagged-union value encoding (`Value`, its
//!   scalar/array/byte-array/string forms, and OLE date conversion).
//! - [`packet`]: the outer packet envelope (SOH/length/serial/version or
//!   retry/payload/EOT framing, plus stream-only compression).
//!
//! Transport state machines (stream resync, datagram retry) and the HRESULT
//! error-translation policy live in the `bcap-client` crate, which depends
//! on this one.

mod cursor;
pub mod date;
pub mod error;
pub mod packet;
pub mod tag;
pub mod value;

pub use error::{Error, Result};
pub use packet::{deserialize_datagram, deserialize_stream, serialize_datagram, serialize_stream, Decoded};
pub use value::{decode_value_bytes, Value};
