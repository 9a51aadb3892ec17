//! Client facade: transport selection, locking, and HRESULT translation.

use std::sync::Mutex;
use std::time::Duration;

use bcap_proto::error::hresult;
use bcap_proto::{Decoded, Value};

use crate::datagram::{DatagramTransport, RETRY_DEFAULT};
use crate::endpoint::Endpoint;
use crate::error::{ClientError, Result};
use crate::stream::StreamTransport;

/// `service_start`'s function ID.
const FUNCTION_SERVICE_START: i32 = 1;
/// `service_stop`'s function ID.
const FUNCTION_SERVICE_STOP: i32 = 2;

enum Transport {
    Stream(StreamTransport),
    Datagram(DatagramTransport),
}

impl Transport {
    fn select(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Stream(StreamTransport::new())),
            "udp" => Ok(Self::Datagram(DatagramTransport::new())),
            other => Err(ClientError::configuration(format!("transport {other:?} not implemented"))),
        }
    }

    fn connect(&mut self, endpoint: &Endpoint, timeout: Duration, retry: u16) -> Result<()> {
        match self {
            Self::Stream(t) => t.connect(endpoint, timeout),
            Self::Datagram(t) => {
                t.set_retry(retry)?;
                t.connect(endpoint, timeout)
            },
        }
    }

    fn disconnect(&mut self) {
        match self {
            Self::Stream(t) => t.disconnect(),
            Self::Datagram(t) => t.disconnect(),
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        match self {
            Self::Stream(t) => t.set_timeout(timeout),
            Self::Datagram(t) => t.set_timeout(timeout),
        }
    }

    fn timeout(&self) -> Duration {
        match self {
            Self::Stream(t) => t.timeout(),
            Self::Datagram(t) => t.timeout(),
        }
    }

    fn set_compression(&mut self, enabled: bool, level: i32) -> Result<()> {
        match self {
            Self::Stream(t) => t.set_compression(enabled, level),
            Self::Datagram(t) => t.set_compression(enabled, level),
        }
    }

    fn request(&mut self, function_id: i32, arguments: &[Value]) -> Result<Decoded> {
        match self {
            Self::Stream(t) => t.request(function_id, arguments),
            Self::Datagram(t) => t.request(function_id, arguments),
        }
    }
}

/// The shape of a completed call, chosen once at construction by
/// `should_return_hr`.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// `should_return_hr = false`: a non-negative status translated to its
    /// return value directly. A negative status is never represented this
    /// way — it is raised as an error instead.
    Value(Value),
    /// `should_return_hr = true`: the server's status is always surfaced
    /// alongside the value, even when it denotes failure.
    WithStatus(i32, Value),
}

/// Entry point: selects one transport and dispatches `(function_id, args)`
/// calls to it under a single lock, matching the concurrency model in
/// `SPEC_FULL.md` §5 without a reentrant-lock dependency (see `disconnect`).
pub struct Client {
    transport: Mutex<Transport>,
    should_return_hr: bool,
}

impl Client {
    /// Build a client over `transport_name` (`"tcp"` or `"udp"`,
    /// case-insensitive).
    pub fn new(transport_name: &str, should_return_hr: bool) -> Result<Self> {
        Ok(Self { transport: Mutex::new(Transport::select(transport_name)?), should_return_hr })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Transport> {
        self.transport.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Connect to `endpoint` (`host[:port]`, default port 5007).
    pub fn connect(&self, endpoint: &str, timeout: Duration, retry: u16) -> Result<()> {
        if !(crate::datagram::RETRY_MIN..=crate::datagram::RETRY_MAX).contains(&retry) {
            return Err(ClientError::configuration(format!(
                "retry count {retry} out of range [{}, {}]",
                crate::datagram::RETRY_MIN,
                crate::datagram::RETRY_MAX
            )));
        }
        let parsed = Endpoint::parse(endpoint)?;
        self.lock().connect(&parsed, timeout, retry)
    }

    /// Connect with the default retry count (1). Meaningless for the
    /// stream transport, which ignores it.
    pub fn connect_default_retry(&self, endpoint: &str, timeout: Duration) -> Result<()> {
        self.connect(endpoint, timeout, RETRY_DEFAULT)
    }

    /// Best-effort `service_stop` followed by transport teardown. Errors
    /// from `service_stop` (including "not connected") are swallowed; this
    /// never fails.
    pub fn disconnect(&self) {
        let mut guard = self.lock();
        let _ = guard.request(FUNCTION_SERVICE_STOP, &[]);
        guard.disconnect();
    }

    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.lock().set_timeout(timeout)
    }

    pub fn get_timeout(&self) -> Duration {
        self.lock().timeout()
    }

    /// Stream transport only: datagram unconditionally rejects this, as the
    /// reference client does.
    pub fn set_compression(&self, enabled: bool, level: i32) -> Result<()> {
        self.lock().set_compression(enabled, level)
    }

    /// Issue `service_start` (function ID 1).
    pub fn service_start(&self) -> Result<Response> {
        self.request(FUNCTION_SERVICE_START, &[Value::Bstr(String::new())])
    }

    /// Issue one call, applying the `should_return_hr` policy to the
    /// server's response.
    pub fn request(&self, function_id: i32, arguments: &[Value]) -> Result<Response> {
        let decoded = self.lock().request(function_id, arguments)?;
        let value = decoded.return_value();

        if self.should_return_hr {
            return Ok(Response::WithStatus(decoded.hresult, value));
        }
        if hresult::is_failure(decoded.hresult) {
            return Err(bcap_proto::Error::from_hr(decoded.hresult).into());
        }
        Ok(Response::Value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::thread;

    #[test]
    fn unknown_transport_is_rejected() {
        assert!(Client::new("carrier-pigeon", false).is_err());
    }

    #[test]
    fn transport_selector_is_case_insensitive() {
        assert!(Client::new("TCP", false).is_ok());
        assert!(Client::new("Udp", false).is_ok());
    }

    #[test]
    fn should_return_hr_false_raises_on_negative_status() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || {
            let mut buf = [0u8; 512];
            let (n, from) = server.recv_from(&mut buf).unwrap();
            let decoded = bcap_proto::deserialize_datagram(&buf[..n]).unwrap();
            let response = bcap_proto::packet::serialize_datagram(
                decoded.serial,
                0,
                bcap_proto::error::hresult::E_FAIL,
                &[],
            )
            .unwrap();
            server.send_to(&response, from).unwrap();
        });

        let client = Client::new("udp", false).unwrap();
        client
            .connect(&format!("{}:{}", addr.ip(), addr.port()), Duration::from_secs(2), 1)
            .unwrap();

        let err = client.request(3, &[]).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(e) if e.hr == bcap_proto::error::hresult::E_FAIL));
    }

    #[test]
    fn should_return_hr_true_never_raises_for_server_status() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || {
            let mut buf = [0u8; 512];
            let (n, from) = server.recv_from(&mut buf).unwrap();
            let decoded = bcap_proto::deserialize_datagram(&buf[..n]).unwrap();
            let response = bcap_proto::packet::serialize_datagram(
                decoded.serial,
                0,
                bcap_proto::error::hresult::E_FAIL,
                &[],
            )
            .unwrap();
            server.send_to(&response, from).unwrap();
        });

        let client = Client::new("udp", true).unwrap();
        client
            .connect(&format!("{}:{}", addr.ip(), addr.port()), Duration::from_secs(2), 1)
            .unwrap();

        let response = client.request(3, &[]).unwrap();
        assert_eq!(response, Response::WithStatus(bcap_proto::error::hresult::E_FAIL, Value::Empty));
    }

    #[test]
    fn disconnect_without_connect_never_panics_or_fails() {
        let client = Client::new("tcp", false).unwrap();
        client.disconnect();
    }

    #[test]
    fn connect_rejects_out_of_range_retry() {
        let client = Client::new("udp", false).unwrap();
        assert!(client.connect("127.0.0.1:1", Duration::from_millis(10), 0).is_err());
        assert!(client.connect("127.0.0.1:1", Duration::from_millis(10), 8).is_err());
    }
}
