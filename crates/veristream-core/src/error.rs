//! Boundary error type for Veristream sessions.
//!
//! Only fatal conditions surface as `Err`: bad call parameters, a poisoned
//! session, an incompatible manifest version, a TLV body that cannot be
//! decoded, unusable key material, or pending-state overflow. Recoverable
//! stream damage (malformed units, lost or late SEIs, a changed key) is
//! reported through verdicts and report fields while the stream continues.

use thiserror::Error;
use veristream_crypto::KeyError;
use veristream_proto::ProtocolError;

/// Errors returned at the session boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A call parameter was invalid (empty unit, zero recurrence interval).
    #[error("invalid parameter")]
    InvalidParameter,

    /// The operation is not available in the session's current state — most
    /// commonly a session poisoned by a fatal error and awaiting `reset()`,
    /// or a signer used before a key was installed.
    #[error("operation not supported in the current session state")]
    NotSupported,

    /// A manifest was emitted by an incompatible protocol major version.
    #[error("incompatible manifest version {major}.{minor}")]
    IncompatibleVersion {
        /// Major version found on the wire
        major: u8,
        /// Minor version found on the wire
        minor: u8,
    },

    /// A Veristream SEI carried a TLV body that cannot be decoded.
    #[error("manifest decoding failed: {0}")]
    Decoding(#[from] ProtocolError),

    /// Key material could not be used by the crypto layer.
    #[error("external crypto failure: {0}")]
    External(#[from] KeyError),

    /// More groups than [`crate::validator::MAX_PENDING_GOPS`] queued up
    /// awaiting a public key.
    #[error("more than {max} groups pending a public key")]
    PendingCapacityExceeded {
        /// The fixed ring capacity
        max: usize,
    },
}

impl SessionError {
    /// Whether this error poisons the session until `reset()` is called.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidParameter | Self::NotSupported)
    }
}

/// Convenience alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::MAX_PENDING_GOPS;

    #[test]
    fn parameter_errors_are_not_fatal() {
        assert!(!SessionError::InvalidParameter.is_fatal());
        assert!(!SessionError::NotSupported.is_fatal());
    }

    #[test]
    fn decode_and_capacity_errors_are_fatal() {
        assert!(SessionError::IncompatibleVersion { major: 2, minor: 0 }.is_fatal());
        assert!(SessionError::PendingCapacityExceeded { max: MAX_PENDING_GOPS }.is_fatal());
        assert!(
            SessionError::Decoding(ProtocolError::MissingTag { tag: 0x7F }).is_fatal()
        );
    }
}
