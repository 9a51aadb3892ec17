//! HRESULT-carrying error type shared by protocol, transport, and server
//! errors.
//!
//! b-CAP has no separate exception hierarchy: every failure, whether raised
//! locally (malformed packet, unsupported VARIANT type) or reported by the
//! server (a negative status in an otherwise well-formed response), is
//! represented the same way. Callers branch on [`Error::hr`], not on type.

use std::fmt;

/// Well-known HRESULT status codes used by this protocol.
///
/// The sign bit (bit 31) marks failure; values `>= 0` (including
/// [`S_OK`] and [`S_EXECUTING`]) are success.
pub mod hresult {
    /// Generic failure.
    pub const E_FAIL: i32 = 0x8000_4005_u32 as i32;
    /// The codec does not support this VARIANT type.
    pub const E_CAO_VARIANT_TYPE_NO_SUPPORT: i32 = 0x8000_0203_u32 as i32;
    /// Not an error: the operation is still executing on the server. The
    /// caller must keep reading on the same serial for a final response.
    pub const S_EXECUTING: i32 = 0x0000_0900;
    /// A packet failed structural validation, or exceeded a transport size
    /// limit before any I/O was attempted.
    pub const E_INVALID_PACKET: i32 = 0x8001_0000_u32 as i32;
    /// Success, no special condition.
    pub const S_OK: i32 = 0;

    /// Whether `hr` denotes failure (sign bit set).
    #[must_use]
    pub fn is_failure(hr: i32) -> bool {
        hr < 0
    }
}

/// An HRESULT plus an optional human-readable message.
///
/// `Display` renders `[{hr:#010X}] {message}`, matching the reference
/// client's exception formatting so log output stays comparable across
/// implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{hr:#010X}] {}", message.as_deref().unwrap_or("b-CAP server returns an error."))]
pub struct Error {
    /// The HRESULT status code. Negative (sign bit set) means failure.
    pub hr: i32,
    /// Optional context. `None` renders the generic "server returns an
    /// error" message, used for bare server-reported failures.
    pub message: Option<String>,
}

impl Error {
    /// Build an error with an explicit message.
    pub fn new(hr: i32, message: impl Into<String>) -> Self {
        Self { hr, message: Some(message.into()) }
    }

    /// Build an error carrying only the HRESULT (no local message), as for
    /// an unannotated server-reported failure.
    #[must_use]
    pub fn from_hr(hr: i32) -> Self {
        Self { hr, message: None }
    }

    /// Unsupported VARIANT type on encode or decode.
    #[must_use]
    pub fn variant_type_not_supported(detail: impl Into<String>) -> Self {
        Self::new(hresult::E_CAO_VARIANT_TYPE_NO_SUPPORT, detail.into())
    }

    /// Malformed or out-of-bounds packet.
    #[must_use]
    pub fn invalid_packet(detail: impl Into<String>) -> Self {
        Self::new(hresult::E_INVALID_PACKET, detail.into())
    }

    /// Whether this error represents a server-reported failure (as opposed
    /// to a purely local protocol/codec error) is not distinguishable from
    /// the HRESULT alone; callers that need the distinction track it via
    /// the call site instead (see `bcap-client`'s `ClientError`).
    #[must_use]
    pub fn is_failure(&self) -> bool {
        hresult::is_failure(self.hr)
    }
}

/// Convenience alias used throughout the codec.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_message() {
        let err = Error::new(hresult::E_INVALID_PACKET, "packet too short");
        assert_eq!(format!("{err}"), "[0x80010000] packet too short");
    }

    #[test]
    fn display_bare_server_error() {
        let err = Error::from_hr(-1);
        assert_eq!(format!("{err}"), "[0xFFFFFFFF] b-CAP server returns an error.");
    }

    #[test]
    fn success_codes_are_not_failures() {
        assert!(!hresult::is_failure(hresult::S_OK));
        assert!(!hresult::is_failure(hresult::S_EXECUTING));
        assert!(hresult::is_failure(hresult::E_FAIL));
    }
}
