//! The six message kinds and their payload schemas. Schemas are strict: a
//! payload with missing or trailing bytes is a `Length` rejection, so the
//! only EVENT layout that decodes is the canonical 8-byte-timestamp plus
//! 2x2-byte-coordinate form.

use crate::{WireError, WireResult, HEADER_SIZE, MAX_DATAGRAM};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use pulse::PlayerId;
use std::io::{Cursor, Read, Write};

/// Display name field width in INIT, null-padded.
pub const NAME_LEN: usize = 16;

/// On-wire message kind byte.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum MessageKind {
    Init = 1,
    InitAck = 2,
    Snapshot = 3,
    Event = 4,
    Ack = 5,
    GameOver = 6,
}

impl MessageKind {
    #[inline]
    pub fn from_byte(byte: u8) -> Option<MessageKind> {
        match byte {
            1 => Some(MessageKind::Init),
            2 => Some(MessageKind::InitAck),
            3 => Some(MessageKind::Snapshot),
            4 => Some(MessageKind::Event),
            5 => Some(MessageKind::Ack),
            6 => Some(MessageKind::GameOver),
            _ => None,
        }
    }
}

/// One embedded authoritative view of the grid. Immutable once produced.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SnapshotFrame {
    pub id: u32,
    pub timestamp_ms: u64,
    /// Row-major owner bytes, 0 for unclaimed.
    pub grid: Vec<u8>,
}

impl SnapshotFrame {
    /// Encoded size of one frame inside a SNAPSHOT payload.
    #[inline]
    pub fn wire_size(grid_len: usize) -> usize {
        4 + 8 + 2 + grid_len
    }
}

/// One scoreboard row of a GAME_OVER payload.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PlayerScore {
    pub player_id: PlayerId,
    pub score: u16,
}

/// Number of snapshot frames of the given grid length that fit in one
/// datagram alongside the fixed header and the frame count byte.
pub fn frames_per_datagram(grid_len: usize) -> usize {
    let budget = MAX_DATAGRAM - HEADER_SIZE - 1;
    (budget / SnapshotFrame::wire_size(grid_len)).min(u8::MAX as usize)
}

/// Null-pads a display name into the fixed INIT field, truncating to fit.
pub fn pack_name(name: &str) -> [u8; NAME_LEN] {
    let mut field = [0u8; NAME_LEN];
    let bytes = name.as_bytes();
    let len = bytes.len().min(NAME_LEN);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

/// Recovers a display name, stripping the null padding.
pub fn unpack_name(field: &[u8; NAME_LEN]) -> String {
    let end = field.iter().position(|&byte| byte == 0).unwrap_or(NAME_LEN);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// A decoded message payload.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Message {
    /// Client -> server connection request.
    Init { nonce: u64, name: [u8; NAME_LEN] },
    /// Server -> client handshake response. The player id is widened to four
    /// bytes on the wire; valid assignments fit a `PlayerId`.
    InitAck {
        nonce: u64,
        player_id: u32,
        snapshot_id: u32,
        timestamp_ms: u64,
    },
    /// Server -> client authoritative state, newest frame first.
    Snapshot { frames: Vec<SnapshotFrame> },
    /// Client -> server claim attempt.
    Event { timestamp_ms: u64, row: u16, col: u16 },
    /// Client -> server snapshot acknowledgement, optional.
    Ack { snapshot_id: u32 },
    /// Server -> client final scoreboard, score descending.
    GameOver { scores: Vec<PlayerScore> },
}

impl Message {
    #[inline]
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Init { .. } => MessageKind::Init,
            Message::InitAck { .. } => MessageKind::InitAck,
            Message::Snapshot { .. } => MessageKind::Snapshot,
            Message::Event { .. } => MessageKind::Event,
            Message::Ack { .. } => MessageKind::Ack,
            Message::GameOver { .. } => MessageKind::GameOver,
        }
    }

    /// Serializes the payload that follows the fixed header. Writing into a
    /// `Vec` cannot fail; the expects guard programming errors only.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::new();

        match self {
            Message::Init { nonce, name } => {
                payload
                    .write_u64::<BigEndian>(*nonce)
                    .expect("Error writing nonce");
                payload.write_all(name).expect("Error writing name");
            }
            Message::InitAck {
                nonce,
                player_id,
                snapshot_id,
                timestamp_ms,
            } => {
                payload
                    .write_u64::<BigEndian>(*nonce)
                    .expect("Error writing nonce");
                payload
                    .write_u32::<BigEndian>(*player_id)
                    .expect("Error writing player id");
                payload
                    .write_u32::<BigEndian>(*snapshot_id)
                    .expect("Error writing snapshot id");
                payload
                    .write_u64::<BigEndian>(*timestamp_ms)
                    .expect("Error writing timestamp");
            }
            Message::Snapshot { frames } => {
                payload
                    .write_u8(frames.len() as u8)
                    .expect("Error writing frame count");
                for frame in frames {
                    payload
                        .write_u32::<BigEndian>(frame.id)
                        .expect("Error writing frame id");
                    payload
                        .write_u64::<BigEndian>(frame.timestamp_ms)
                        .expect("Error writing frame timestamp");
                    payload
                        .write_u16::<BigEndian>(frame.grid.len() as u16)
                        .expect("Error writing grid length");
                    payload.write_all(&frame.grid).expect("Error writing grid");
                }
            }
            Message::Event {
                timestamp_ms,
                row,
                col,
            } => {
                payload
                    .write_u64::<BigEndian>(*timestamp_ms)
                    .expect("Error writing timestamp");
                payload.write_u16::<BigEndian>(*row).expect("Error writing row");
                payload.write_u16::<BigEndian>(*col).expect("Error writing col");
            }
            Message::Ack { snapshot_id } => {
                payload
                    .write_u32::<BigEndian>(*snapshot_id)
                    .expect("Error writing snapshot id");
            }
            Message::GameOver { scores } => {
                payload
                    .write_u8(scores.len() as u8)
                    .expect("Error writing score count");
                for entry in scores {
                    payload
                        .write_u8(entry.player_id)
                        .expect("Error writing player id");
                    payload
                        .write_u16::<BigEndian>(entry.score)
                        .expect("Error writing score");
                }
            }
        }

        payload
    }

    /// Parses a payload of the given kind. The full payload must be
    /// consumed; anything short, long or internally inconsistent is a
    /// `Length` rejection.
    pub fn from_payload(kind: MessageKind, payload: &[u8]) -> WireResult<Message> {
        let mut cursor = Cursor::new(payload);

        let message = match kind {
            MessageKind::Init => {
                let nonce = cursor.read_u64::<BigEndian>()?;
                let mut name = [0u8; NAME_LEN];
                cursor.read_exact(&mut name)?;
                Message::Init { nonce, name }
            }
            MessageKind::InitAck => Message::InitAck {
                nonce: cursor.read_u64::<BigEndian>()?,
                player_id: cursor.read_u32::<BigEndian>()?,
                snapshot_id: cursor.read_u32::<BigEndian>()?,
                timestamp_ms: cursor.read_u64::<BigEndian>()?,
            },
            MessageKind::Snapshot => {
                let count = cursor.read_u8()?;
                let mut frames = Vec::with_capacity(count as usize);

                for _ in 0..count {
                    let id = cursor.read_u32::<BigEndian>()?;
                    let timestamp_ms = cursor.read_u64::<BigEndian>()?;
                    let grid_len = cursor.read_u16::<BigEndian>()?;
                    let mut grid = vec![0u8; grid_len as usize];
                    cursor.read_exact(&mut grid)?;

                    frames.push(SnapshotFrame {
                        id,
                        timestamp_ms,
                        grid,
                    });
                }

                Message::Snapshot { frames }
            }
            MessageKind::Event => Message::Event {
                timestamp_ms: cursor.read_u64::<BigEndian>()?,
                row: cursor.read_u16::<BigEndian>()?,
                col: cursor.read_u16::<BigEndian>()?,
            },
            MessageKind::Ack => Message::Ack {
                snapshot_id: cursor.read_u32::<BigEndian>()?,
            },
            MessageKind::GameOver => {
                let count = cursor.read_u8()?;
                let mut scores = Vec::with_capacity(count as usize);

                for _ in 0..count {
                    scores.push(PlayerScore {
                        player_id: cursor.read_u8()?,
                        score: cursor.read_u16::<BigEndian>()?,
                    });
                }

                Message::GameOver { scores }
            }
        };

        if cursor.position() as usize != payload.len() {
            return Err(WireError::Length);
        }

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: Message) -> Message {
        let payload = message.to_payload();
        Message::from_payload(message.kind(), &payload).unwrap()
    }

    #[test]
    fn test_init_roundtrip() {
        let message = Message::Init {
            nonce: 7,
            name: pack_name("A"),
        };

        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn test_init_ack_roundtrip() {
        let message = Message::InitAck {
            nonce: 0xdead_beef,
            player_id: 1,
            snapshot_id: 0,
            timestamp_ms: 1_234_567,
        };

        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn test_snapshot_roundtrip_multi_frame() {
        let message = Message::Snapshot {
            frames: vec![
                SnapshotFrame {
                    id: 4,
                    timestamp_ms: 2_000,
                    grid: vec![1, 0, 0, 2],
                },
                SnapshotFrame {
                    id: 3,
                    timestamp_ms: 1_950,
                    grid: vec![1, 0, 0, 0],
                },
            ],
        };

        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn test_event_roundtrip() {
        let message = Message::Event {
            timestamp_ms: 1_000,
            row: 2,
            col: 2,
        };
        let payload = message.to_payload();

        assert_eq!(payload.len(), 12);
        assert_eq!(Message::from_payload(MessageKind::Event, &payload).unwrap(), message);
    }

    #[test]
    fn test_event_rejects_short_delta_layout() {
        // The legacy 2+2+2 layout must not decode.
        let payload = [0u8, 1, 0, 2, 0, 2];

        assert_eq!(
            Message::from_payload(MessageKind::Event, &payload),
            Err(WireError::Length)
        );
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut payload = Message::Ack { snapshot_id: 9 }.to_payload();
        payload.push(0);

        assert_eq!(
            Message::from_payload(MessageKind::Ack, &payload),
            Err(WireError::Length)
        );
    }

    #[test]
    fn test_snapshot_rejects_inconsistent_frame_length() {
        let mut payload = Message::Snapshot {
            frames: vec![SnapshotFrame {
                id: 1,
                timestamp_ms: 0,
                grid: vec![0; 25],
            }],
        }
        .to_payload();

        // Claim a longer grid than the payload carries.
        payload[13] = 26;

        assert_eq!(
            Message::from_payload(MessageKind::Snapshot, &payload),
            Err(WireError::Length)
        );
    }

    #[test]
    fn test_game_over_roundtrip() {
        let message = Message::GameOver {
            scores: vec![
                PlayerScore {
                    player_id: 2,
                    score: 13,
                },
                PlayerScore {
                    player_id: 1,
                    score: 12,
                },
            ],
        };

        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn test_name_padding() {
        let field = pack_name("abc");

        assert_eq!(&field[..3], b"abc");
        assert!(field[3..].iter().all(|&byte| byte == 0));
        assert_eq!(unpack_name(&field), "abc");

        // Over-long names truncate to the field width.
        let field = pack_name("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(unpack_name(&field), "abcdefghijklmnop");
    }

    #[test]
    fn test_frames_per_datagram() {
        // A 5x5 grid frame is 39 bytes; plenty fit under the 1200-byte lid.
        assert!(frames_per_datagram(25) >= 5);
        // A 20x20 grid still leaves room for at least redundancy of two.
        assert!(frames_per_datagram(400) >= 2);
        assert!(frames_per_datagram(400) * SnapshotFrame::wire_size(400) <= MAX_DATAGRAM - HEADER_SIZE - 1);
    }
}
