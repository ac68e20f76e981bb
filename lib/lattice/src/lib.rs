//! The ChronoClash wire protocol: a framed, checksummed application protocol
//! for an unreliable datagram transport. Every datagram opens with a fixed
//! 28-byte header carrying the protocol magic, version, message kind,
//! snapshot id, sender sequence, timestamp, payload length and a CRC-32 over
//! the whole datagram. Anything that fails validation is dropped without a
//! response.

pub mod codec;
pub mod message;

use std::io;

/// 4-byte tag opening every datagram.
pub const PROTOCOL_MAGIC: [u8; 4] = *b"CCLP";

/// Protocol version. Mismatches are dropped, never negotiated.
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 28;

/// Hard ceiling on a datagram, kept below typical MTU to avoid fragmentation.
pub const MAX_DATAGRAM: usize = 1200;

pub type WireResult<T> = Result<T, WireError>;

/// Reasons a datagram fails to validate. Every variant is grounds for
/// silently dropping the datagram; they exist for tests and trace logging,
/// never for responses on the wire.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WireError {
    /// Shorter than the fixed header.
    Truncated,
    /// Magic tag mismatch.
    Magic,
    /// Version mismatch.
    Version,
    /// Unknown message kind byte.
    Kind,
    /// Declared payload length disagrees with the bytes on the wire, or a
    /// payload violates its message schema.
    Length,
    /// CRC-32 mismatch.
    Checksum,
    /// Encoding would exceed the datagram ceiling.
    Oversize,
}

impl From<io::Error> for WireError {
    // Reads past the end of a payload cursor are schema violations.
    #[inline]
    fn from(_: io::Error) -> Self {
        WireError::Length
    }
}
