//! `host[:port]` endpoint parsing.
//!
//! Mirrors the reference converter's `parse_endpoint`: a bare host, or a
//! host and port separated by the last colon that isn't part of a
//! bracketed IPv6 literal. The default port is 5007 for both transports.

use crate::error::{ClientError, Result};

/// The default b-CAP port, used when an endpoint omits one.
pub const DEFAULT_PORT: u16 = 5007;

/// A parsed `host[:port]` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address, brackets (if any) stripped.
    pub host: String,
    /// Port number, defaulted to [`DEFAULT_PORT`] if omitted.
    pub port: u16,
}

impl Endpoint {
    /// Parse `host[:port]`. Fails with [`ClientError::Configuration`] for an
    /// empty host or an unparseable port.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(ClientError::configuration("endpoint must not be empty"));
        }

        if let Some(rest) = endpoint.strip_prefix('[') {
            // Bracketed IPv6 literal: `[::1]` or `[::1]:5007`.
            let Some(close) = rest.find(']') else {
                return Err(ClientError::configuration("unterminated '[' in endpoint"));
            };
            let host = &rest[..close];
            if host.is_empty() {
                return Err(ClientError::configuration("endpoint must not be empty"));
            }
            let after = &rest[close + 1..];
            let port = match after.strip_prefix(':') {
                Some(port_str) => parse_port(port_str)?,
                None if after.is_empty() => DEFAULT_PORT,
                None => {
                    return Err(ClientError::configuration(
                        "unexpected characters after ']' in endpoint",
                    ));
                },
            };
            return Ok(Self { host: host.to_string(), port });
        }

        // Unbracketed: split on the *last* colon, so a bare IPv6 address
        // without brackets (which this library does not otherwise support
        // disambiguating) at least doesn't silently truncate a hostname
        // containing no colons.
        match endpoint.rsplit_once(':') {
            Some((host, port_str)) if !host.is_empty() => {
                Ok(Self { host: host.to_string(), port: parse_port(port_str)? })
            },
            _ => Ok(Self { host: endpoint.to_string(), port: DEFAULT_PORT }),
        }
    }
}

fn parse_port(port_str: &str) -> Result<u16> {
    port_str
        .parse()
        .map_err(|_| ClientError::configuration(format!("invalid port {port_str:?}")))
}
