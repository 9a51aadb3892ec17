//! Client facade and transport state machines for the b-CAP protocol.
//!
//! This crate wires the wire codec in [`bcap_proto`] to two transports:
//!
//! - [`stream`]: a connection-oriented byte-stream transport (TCP) with
//!   partial-read framing, resync on lost sync bytes, and the
//!   `S_EXECUTING` continuation rule.
//! - [`datagram`]: a connectionless transport (UDP) with a hard packet-size
//!   cap and bounded retransmission.
//!
//! [`facade::Client`] selects one of the two at construction time and
//! applies the `should_return_hr` status-translation policy described in
//! `SPEC_FULL.md` §4.6.

pub mod datagram;
pub mod endpoint;
pub mod error;
pub mod facade;
mod serial;
pub mod stream;

pub use bcap_proto::{Error as ProtoError, Value};
pub use endpoint::Endpoint;
pub use error::{ClientError, Result};
pub use facade::{Client, Response};
