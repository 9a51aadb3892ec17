//! Datagram (UDP-like) transport state machine.
//!
//! Stateless apart from the serial counter and the configured peer. Every
//! send carries the accumulated retry count in the field the stream
//! transport uses for protocol version; compression is not supported.

use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use bcap_proto::error::hresult;
use bcap_proto::{packet, Decoded, Value};

use crate::endpoint::Endpoint;
use crate::error::{ClientError, Result};
use crate::serial::SerialCounter;

/// Hard cap on a serialized datagram packet. Checked before any I/O.
pub const MAX_PACKET_SIZE: usize = 504;

/// Minimum allowed `retry` configuration value.
pub const RETRY_MIN: u16 = 1;
/// Maximum allowed `retry` configuration value.
pub const RETRY_MAX: u16 = 7;
/// Default `retry` configuration value.
pub const RETRY_DEFAULT: u16 = 1;

pub(crate) struct DatagramTransport {
    socket: Option<UdpSocket>,
    peer: Option<SocketAddr>,
    serial: SerialCounter,
    timeout: Duration,
    retry: u16,
}

impl DatagramTransport {
    pub(crate) fn new() -> Self {
        Self {
            socket: None,
            peer: None,
            serial: SerialCounter::new(),
            timeout: Duration::from_secs(5),
            retry: RETRY_DEFAULT,
        }
    }

    pub(crate) fn connect(&mut self, endpoint: &Endpoint, timeout: Duration) -> Result<()> {
        self.disconnect();
        self.timeout = timeout;

        let peer = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|e| ClientError::configuration(format!("unresolvable host: {e}")))?
            .next()
            .ok_or_else(|| ClientError::configuration("unresolvable host"))?;

        tracing::debug!(%peer, "bcap datagram connect");
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_read_timeout(Some(timeout))?;
        socket.set_write_timeout(Some(timeout))?;

        self.socket = Some(socket);
        self.peer = Some(peer);
        self.serial.reset();
        Ok(())
    }

    pub(crate) fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            tracing::debug!("bcap datagram disconnect");
        }
        self.peer = None;
        self.serial.reset();
    }

    pub(crate) fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        if let Some(socket) = &self.socket {
            socket.set_read_timeout(Some(timeout))?;
            socket.set_write_timeout(Some(timeout))?;
        }
        Ok(())
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `set_compression` has no grounded UDP counterpart: the reference
    /// client raises `NotImplementedError` unconditionally here.
    pub(crate) fn set_compression(&mut self, _enabled: bool, _level: i32) -> Result<()> {
        Err(ClientError::configuration("compression is not supported on the datagram transport"))
    }

    pub(crate) fn set_retry(&mut self, retry: u16) -> Result<()> {
        if !(RETRY_MIN..=RETRY_MAX).contains(&retry) {
            return Err(ClientError::configuration(format!(
                "retry count {retry} out of range [{RETRY_MIN}, {RETRY_MAX}]"
            )));
        }
        self.retry = retry;
        Ok(())
    }

    /// `retry_count` accumulates across the whole call; the serial advances
    /// on every send attempt, including retries. A protocol error from the
    /// codec (e.g. oversize packet) propagates immediately without
    /// consuming retry budget — only I/O failures do.
    pub(crate) fn request(&mut self, function_id: i32, arguments: &[Value]) -> Result<Decoded> {
        let (Some(socket), Some(peer)) = (&self.socket, self.peer) else {
            return Err(ClientError::configuration("not connected"));
        };

        let mut retry_count: u16 = 0;
        loop {
            let serial = self.serial.take();
            let bytes = packet::serialize_datagram(serial, retry_count, function_id, arguments)?;
            if bytes.len() > MAX_PACKET_SIZE {
                return Err(bcap_proto::Error::invalid_packet(format!(
                    "serialized packet of {} bytes exceeds the {MAX_PACKET_SIZE}-byte datagram cap",
                    bytes.len()
                ))
                .into());
            }

            match send_and_receive(socket, peer, &bytes, serial) {
                Ok(decoded) => return Ok(decoded),
                Err(ClientError::Io(e)) if is_retryable(&e) => {
                    retry_count += 1;
                    tracing::debug!(retry_count, retry_budget = self.retry, "datagram retry");
                    // `retry` consecutive failures are tolerated (one more send attempt
                    // follows each); only the (retry + 1)-th consecutive failure exhausts
                    // the budget, per the "set_retry(3); 3 timeouts then success on
                    // attempt 4" scenario.
                    if retry_count > self.retry {
                        return Err(ClientError::RetriesExceeded);
                    }
                },
                Err(other) => return Err(other),
            }
        }
    }
}

fn is_retryable(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
    )
}

fn send_and_receive(
    socket: &UdpSocket,
    peer: SocketAddr,
    request_bytes: &[u8],
    expected_serial: u16,
) -> Result<Decoded> {
    socket.send_to(request_bytes, peer)?;

    let mut buf = [0u8; MAX_PACKET_SIZE];
    loop {
        let (n, from) = socket.recv_from(&mut buf)?;
        if from != peer {
            tracing::debug!(%from, %peer, "discarding datagram from unexpected peer");
            continue;
        }

        let decoded = packet::deserialize_datagram(&buf[..n])?;
        if decoded.serial != expected_serial {
            tracing::debug!(serial = decoded.serial, expected_serial, "discarding stale response");
            continue;
        }
        if decoded.hresult == hresult::S_EXECUTING {
            continue;
        }
        return Ok(decoded);
    }
}
