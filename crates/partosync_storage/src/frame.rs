//! Log frame format for the file store.
//!
//! ```text
//! +-------+---------+------+---------+-------------+-----+---------+-------+
//! | magic | version | kind | key_len | payload_len | key | payload | crc32 |
//! |  4 B  |  u16 LE | u8   |  u16 LE |   u32 LE    |     |         | u32LE |
//! +-------+---------+------+---------+-------------+-----+---------+-------+
//! ```
//!
//! The CRC covers the header, key and payload.

use crate::error::{StorageError, StorageResult};

/// Magic bytes identifying a log frame.
pub const FRAME_MAGIC: [u8; 4] = *b"PSRL";

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

/// Size of the fixed frame header.
pub(crate) const HEADER_SIZE: usize = 4 + 2 + 1 + 2 + 4;

/// Size of the trailing checksum.
pub(crate) const CRC_SIZE: usize = 4;

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// A record keyed by a 16-byte record key.
    Record = 1,
    /// A named metadata entry.
    Meta = 2,
}

impl FrameKind {
    /// Converts a byte to a frame kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Record),
            2 => Some(Self::Meta),
            _ => None,
        }
    }
}

/// One entry of the record log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame kind.
    pub kind: FrameKind,
    /// Record key bytes or metadata name bytes.
    pub key: Vec<u8>,
    /// Stored bytes.
    pub payload: Vec<u8>,
}

/// Result of decoding the frame at some offset.
#[derive(Debug)]
pub(crate) enum Decoded {
    /// A complete, valid frame and its encoded length.
    Frame(Frame, usize),
    /// The buffer ends in the middle of a frame (torn write).
    Torn,
}

impl Frame {
    /// Creates a record frame.
    pub fn record(key: &[u8; 16], payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Record,
            key: key.to_vec(),
            payload,
        }
    }

    /// Creates a metadata frame.
    pub fn meta(name: &str, payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Meta,
            key: name.as_bytes().to_vec(),
            payload,
        }
    }

    /// Encodes the frame including header and checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or payload exceed their length fields.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let key_len = u16::try_from(self.key.len())
            .map_err(|_| StorageError::corrupted("frame key too long"))?;
        let payload_len = u32::try_from(self.payload.len())
            .map_err(|_| StorageError::corrupted("frame payload too large"))?;

        let capacity = HEADER_SIZE + self.key.len() + self.payload.len() + CRC_SIZE;
        let mut buf = Vec::with_capacity(capacity);
        buf.extend_from_slice(&FRAME_MAGIC);
        buf.extend_from_slice(&FRAME_VERSION.to_le_bytes());
        buf.push(self.kind as u8);
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.payload);

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decodes the frame starting at `offset` in `data`.
    pub(crate) fn decode_at(data: &[u8], offset: usize) -> StorageResult<Decoded> {
        let rest = &data[offset..];
        if rest.len() < HEADER_SIZE {
            return Ok(Decoded::Torn);
        }

        if rest[0..4] != FRAME_MAGIC {
            return Err(StorageError::corrupted(format!(
                "invalid magic at offset {offset}"
            )));
        }

        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version > FRAME_VERSION {
            return Err(StorageError::corrupted(format!(
                "unsupported frame version {version} at offset {offset}"
            )));
        }

        let kind = FrameKind::from_byte(rest[6]).ok_or_else(|| {
            StorageError::corrupted(format!("unknown frame kind {} at offset {offset}", rest[6]))
        })?;
        let key_len = u16::from_le_bytes([rest[7], rest[8]]) as usize;
        let payload_len = u32::from_le_bytes([rest[9], rest[10], rest[11], rest[12]]) as usize;

        let body_end = HEADER_SIZE + key_len + payload_len;
        let total = body_end + CRC_SIZE;
        if rest.len() < total {
            return Ok(Decoded::Torn);
        }

        let stored = u32::from_le_bytes([
            rest[body_end],
            rest[body_end + 1],
            rest[body_end + 2],
            rest[body_end + 3],
        ]);
        let computed = compute_crc32(&rest[..body_end]);
        if stored != computed {
            // A bad checksum on the final frame is a torn write, not corruption
            if offset + total == data.len() {
                return Ok(Decoded::Torn);
            }
            return Err(StorageError::ChecksumMismatch {
                offset: offset as u64,
                expected: stored,
                actual: computed,
            });
        }

        let key = rest[HEADER_SIZE..HEADER_SIZE + key_len].to_vec();
        let payload = rest[HEADER_SIZE + key_len..body_end].to_vec();
        Ok(Decoded::Frame(Frame { kind, key, payload }, total))
    }
}

/// Returns the offset of the first intact frame starting at or after `from`.
///
/// A frame that claims to run past the end of the log is only a torn tail
/// if nothing intact follows it; otherwise its header is damaged.
pub(crate) fn next_intact_frame(data: &[u8], from: usize) -> Option<usize> {
    (from..data.len())
        .filter(|&at| data[at..].starts_with(&FRAME_MAGIC))
        .find(|&at| matches!(Frame::decode_at(data, at), Ok(Decoded::Frame(..))))
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // IEEE polynomial, reflected
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
