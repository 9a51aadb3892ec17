//! Stream (TCP-like) transport state machine.
//!
//! Connection states: `disconnected -> connecting -> connected`; on any
//! failure the transport drops back to `disconnected` with the socket
//! closed. No partial state survives a failed `request`.

use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use bcap_proto::error::hresult;
use bcap_proto::{packet, Decoded, Value};

use crate::endpoint::Endpoint;
use crate::error::{ClientError, Result};
use crate::serial::SerialCounter;

/// Protocol version field this client advertises on every stream packet.
const PROTOCOL_VERSION: u16 = 1;

/// Connection-oriented transport. Owns at most one [`TcpStream`]; `None`
/// means `disconnected`.
pub struct StreamTransport {
    reader: Option<BufReader<TcpStream>>,
    serial: SerialCounter,
    timeout: Duration,
    compression_level: Option<i32>,
}

impl StreamTransport {
    pub(crate) fn new() -> Self {
        Self { reader: None, serial: SerialCounter::new(), timeout: Duration::from_secs(5), compression_level: None }
    }

    /// Connect to `endpoint`, disconnecting first (idempotent reconnect, as
    /// the reference client does).
    pub(crate) fn connect(&mut self, endpoint: &Endpoint, timeout: Duration) -> Result<()> {
        self.disconnect();
        self.timeout = timeout;

        tracing::debug!(host = %endpoint.host, port = endpoint.port, "bcap stream connect");
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        self.reader = Some(BufReader::new(stream));
        self.serial.reset();
        Ok(())
    }

    /// Best-effort shutdown and close. Never fails; resets the serial
    /// counter even if there was nothing connected.
    pub(crate) fn disconnect(&mut self) {
        if let Some(reader) = self.reader.take() {
            let stream = reader.into_inner();
            tracing::debug!("bcap stream disconnect");
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.serial.reset();
    }

    pub(crate) fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        if let Some(reader) = &self.reader {
            reader.get_ref().set_read_timeout(Some(timeout))?;
            reader.get_ref().set_write_timeout(Some(timeout))?;
        }
        Ok(())
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn set_compression(&mut self, enabled: bool, level: i32) -> Result<()> {
        // The reference client validates `level` unconditionally, even when
        // `enabled` is false, rather than only when compression is turned on.
        if !(-1..=9).contains(&level) {
            return Err(ClientError::configuration(format!(
                "compression level {level} out of range [-1, 9]"
            )));
        }
        self.compression_level = enabled.then_some(level);
        Ok(())
    }

    /// Send one request and wait for its final (non-`S_EXECUTING`)
    /// response.
    pub(crate) fn request(&mut self, function_id: i32, arguments: &[Value]) -> Result<Decoded> {
        let Some(reader) = &mut self.reader else {
            return Err(ClientError::configuration("not connected"));
        };

        let serial = self.serial.take();
        let bytes = packet::serialize_stream(
            serial,
            PROTOCOL_VERSION,
            function_id,
            arguments,
            self.compression_level,
        )?;

        let result = send_and_receive(reader, &bytes, serial);
        if result.is_err() {
            // No partial state survives a failed request.
            self.disconnect();
        }
        result
    }
}

fn send_and_receive(
    reader: &mut BufReader<TcpStream>,
    request_bytes: &[u8],
    expected_serial: u16,
) -> Result<Decoded> {
    reader.get_mut().write_all(request_bytes)?;

    loop {
        let frame = read_one_frame(reader)?;
        let decoded = packet::deserialize_stream(&frame)?;

        if decoded.serial != expected_serial {
            tracing::debug!(serial = decoded.serial, expected_serial, "discarding stale response");
            continue;
        }
        if decoded.hresult == hresult::S_EXECUTING {
            tracing::debug!(serial = decoded.serial, "still executing, continuing to read");
            continue;
        }
        return Ok(decoded);
    }
}

/// Read one full packet, resynchronizing byte-by-byte on SOH and tolerating
/// arbitrary chunking.
fn read_one_frame(reader: &mut BufReader<TcpStream>) -> Result<Vec<u8>> {
    loop {
        let mut soh = [0u8; 1];
        reader.read_exact(&mut soh)?;
        if soh[0] != packet::SOH {
            continue;
        }

        let mut header_rest = [0u8; 4];
        reader.read_exact(&mut header_rest)?;
        let mut length_bytes = [0u8; 5];
        length_bytes[0] = soh[0];
        length_bytes[1..].copy_from_slice(&header_rest);
        let total_len = packet::peek_total_length(&length_bytes)? as usize;

        if total_len < 5 {
            // Can't be a valid packet; resync from the next byte.
            continue;
        }

        let mut frame = vec![0u8; total_len];
        frame[..5].copy_from_slice(&length_bytes);
        reader.read_exact(&mut frame[5..])?;

        if frame[total_len - 1] != packet::EOT {
            tracing::warn!("frame missing EOT, resynchronizing");
            continue;
        }

        return Ok(frame);
    }
}
