//! Error types for the wire formats.
//!
//! Unit parsing never fails — a malformed unit yields a record with its
//! validity downgraded, and the session layer turns that into an `unknown`
//! verdict. Errors here are reserved for the TLV manifest codec, where a
//! truncated or overrunning payload is a fatal stream error.

use thiserror::Error;

/// Errors produced while decoding or encoding a signed SEI manifest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A tag header was started but the payload ended before tag and length
    /// were complete.
    #[error("truncated TLV: needed {needed} more bytes at offset {offset}")]
    Truncated {
        /// Bytes missing to complete the tag header or value
        needed: usize,
        /// Offset into the TLV body where decoding stopped
        offset: usize,
    },

    /// A tag's declared length runs past the end of the payload.
    #[error("TLV overrun: tag {tag:#04x} declares {length} bytes, {remaining} remain")]
    Overrun {
        /// Tag whose length field is inconsistent
        tag: u8,
        /// Declared value length
        length: usize,
        /// Bytes actually remaining in the payload
        remaining: usize,
    },

    /// A fixed-size field had the wrong length.
    #[error("tag {tag:#04x}: expected {expected} value bytes, got {actual}")]
    InvalidFieldLength {
        /// Tag with the malformed value
        tag: u8,
        /// Required value length
        expected: usize,
        /// Length found on the wire
        actual: usize,
    },

    /// A mandatory tag was absent from the body.
    #[error("mandatory tag {tag:#04x} missing from manifest")]
    MissingTag {
        /// The absent tag
        tag: u8,
    },

    /// Bytes followed the signature tag, which must terminate the body.
    #[error("{count} bytes trail the signature tag")]
    TrailingBytes {
        /// Number of trailing bytes
        count: usize,
    },

    /// The manifest was produced by an incompatible protocol major version.
    #[error("unsupported manifest version {major}.{minor} (supported major: {supported})")]
    UnsupportedVersion {
        /// Major version on the wire
        major: u8,
        /// Minor version on the wire
        minor: u8,
        /// Major version this build understands
        supported: u8,
    },

    /// A string field did not hold valid UTF-8.
    #[error("tag {tag:#04x}: string field is not valid UTF-8")]
    InvalidUtf8 {
        /// Tag with the malformed string
        tag: u8,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;
