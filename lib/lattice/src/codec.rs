//! Packing and validation of the fixed datagram header.

use crate::message::MessageKind;
use crate::{WireError, WireResult, HEADER_SIZE, MAX_DATAGRAM, PROTOCOL_MAGIC, PROTOCOL_VERSION};
use byteorder::{BigEndian, ByteOrder};
use crc::{Crc, CRC_32_ISO_HDLC};

// CRC-32/ISO-HDLC, the zlib polynomial.
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

const CHECKSUM_OFFSET: usize = 24;

/// Decoded fixed header of a validated datagram.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Header {
    pub kind: MessageKind,
    /// Server-assigned snapshot id; 0 in non-snapshot messages.
    pub snapshot_id: u32,
    /// Sender-local monotonic sequence.
    pub sequence: u32,
    /// Sender wall clock at send time, milliseconds.
    pub timestamp_ms: u64,
    pub payload_len: u16,
}

/// Packs a complete datagram: header with a zeroed checksum field, payload,
/// then the CRC-32 over the whole run rewritten into the checksum field.
/// All multi-byte fields are network byte order.
pub fn encode(
    kind: MessageKind,
    snapshot_id: u32,
    sequence: u32,
    timestamp_ms: u64,
    payload: &[u8],
) -> WireResult<Vec<u8>> {
    let total = HEADER_SIZE + payload.len();

    if payload.len() > u16::MAX as usize || total > MAX_DATAGRAM {
        return Err(WireError::Oversize);
    }

    let mut datagram = vec![0u8; total];

    datagram[..4].copy_from_slice(&PROTOCOL_MAGIC);
    datagram[4] = PROTOCOL_VERSION;
    datagram[5] = kind as u8;
    BigEndian::write_u32(&mut datagram[6..10], snapshot_id);
    BigEndian::write_u32(&mut datagram[10..14], sequence);
    BigEndian::write_u64(&mut datagram[14..22], timestamp_ms);
    BigEndian::write_u16(&mut datagram[22..24], payload.len() as u16);
    // The checksum field stays zero while the digest runs.
    datagram[HEADER_SIZE..].copy_from_slice(payload);

    let checksum = CRC32.checksum(&datagram);
    BigEndian::write_u32(&mut datagram[CHECKSUM_OFFSET..HEADER_SIZE], checksum);

    Ok(datagram)
}

/// Validates and splits a datagram into its header and payload. Rejections
/// are checked in order: truncation, magic, version, kind, declared length,
/// checksum.
pub fn decode(datagram: &[u8]) -> WireResult<(Header, &[u8])> {
    if datagram.len() < HEADER_SIZE {
        return Err(WireError::Truncated);
    }
    if datagram[..4] != PROTOCOL_MAGIC {
        return Err(WireError::Magic);
    }
    if datagram[4] != PROTOCOL_VERSION {
        return Err(WireError::Version);
    }

    let kind = match MessageKind::from_byte(datagram[5]) {
        Some(kind) => kind,
        None => return Err(WireError::Kind),
    };

    let payload = &datagram[HEADER_SIZE..];
    let payload_len = BigEndian::read_u16(&datagram[22..24]);

    if payload_len as usize != payload.len() {
        return Err(WireError::Length);
    }

    let declared = BigEndian::read_u32(&datagram[CHECKSUM_OFFSET..HEADER_SIZE]);

    let mut digest = CRC32.digest();
    digest.update(&datagram[..CHECKSUM_OFFSET]);
    digest.update(&[0u8; 4]);
    digest.update(payload);

    if digest.finalize() != declared {
        return Err(WireError::Checksum);
    }

    let header = Header {
        kind,
        snapshot_id: BigEndian::read_u32(&datagram[6..10]),
        sequence: BigEndian::read_u32(&datagram[10..14]),
        timestamp_ms: BigEndian::read_u64(&datagram[14..22]),
        payload_len,
    };

    Ok((header, payload))
}
