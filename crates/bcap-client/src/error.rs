//! Client-level error type.
//!
//! Wraps the codec's HRESULT-carrying [`bcap_proto::Error`] and adds the
//! two failure kinds that only exist once there is a socket and a
//! configuration surface: local configuration mistakes, and I/O failure.

use thiserror::Error;

/// A client-facing failure.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A protocol or codec failure (malformed packet, unsupported VARIANT
    /// type, packet oversize) or a server-reported negative HRESULT.
    #[error(transparent)]
    Protocol(#[from] bcap_proto::Error),

    /// A configuration mistake caught before any I/O: invalid endpoint,
    /// out-of-range retry count, out-of-range compression level, or an
    /// unknown transport selector.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A socket-level failure (connection refused, read/write error).
    /// Timeouts are reported the same way, distinguished by `kind()`.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The datagram transport exhausted its retry budget.
    #[error("The number of retries has been exceeded.")]
    RetriesExceeded,
}

impl ClientError {
    /// Build a [`ClientError::Configuration`] error.
    pub fn configuration(detail: impl Into<String>) -> Self {
        Self::Configuration(detail.into())
    }

    /// The HRESULT this error would translate to for a caller using the
    /// `should_return_hr = false` policy. Local failures that have no
    /// natural HRESULT (configuration, I/O, retry exhaustion) surface as
    /// `E_FAIL`, matching the reference client's retry-exhaustion message.
    #[must_use]
    pub fn hresult(&self) -> i32 {
        match self {
            Self::Protocol(e) => e.hr,
            Self::Configuration(_) | Self::Io(_) | Self::RetriesExceeded => {
                bcap_proto::error::hresult::E_FAIL
            },
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_exceeded_message_matches_reference_client() {
        let err = ClientError::RetriesExceeded;
        assert_eq!(err.to_string(), "The number of retries has been exceeded.");
    }

    #[test]
    fn local_failures_translate_to_e_fail() {
        assert_eq!(ClientError::RetriesExceeded.hresult(), bcap_proto::error::hresult::E_FAIL);
        assert_eq!(
            ClientError::configuration("bad").hresult(),
            bcap_proto::error::hresult::E_FAIL
        );
    }
}
