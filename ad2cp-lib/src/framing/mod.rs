//! AD2CP frame reading.
//!
//! Every record in an AD2CP data stream starts with a 10 byte header:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 1 | sync, always `0xA5` |
//! | 1 | 1 | header size, always `0x0A` |
//! | 2 | 1 | record id |
//! | 3 | 1 | data series family |
//! | 4 | 2 | payload size |
//! | 6 | 2 | payload checksum |
//! | 8 | 2 | header checksum |
//!
//! Multi-byte fields are little-endian. The first two bytes act as the sync marker
//! and the remaining 8 are referred to as the frame prefix.
mod bytes;
mod synchronizer;

pub use synchronizer::*;

#[cfg(feature = "serde")]
use serde::Serialize;
use std::collections::BTreeMap;

/// The two byte sync marker preceding every frame prefix.
pub const SYNC: [u8; 2] = [0xa5, 0x0a];

/// Seed value for the Nortek checksum.
pub const CHECKSUM_SEED: u16 = 0xb58c;

/// Nortek checksum of `dat`.
///
/// Sum of little-endian 16-bit words seeded with [CHECKSUM_SEED]. A trailing odd byte
/// is added as the high byte of a word.
#[must_use]
pub fn checksum(dat: &[u8]) -> u16 {
    let mut chunks = dat.chunks_exact(2);
    let mut sum = chunks
        .by_ref()
        .fold(CHECKSUM_SEED, |acc, w| acc.wrapping_add(u16::from_le_bytes([w[0], w[1]])));
    if let [b] = chunks.remainder() {
        sum = sum.wrapping_add(u16::from(*b) << 8);
    }
    sum
}

/// A single record read from the stream. The payload is not interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub id: u8,
    pub family: u8,
    /// Payload checksum as declared in the prefix.
    pub data_checksum: u16,
    /// Header checksum as declared in the prefix.
    pub header_checksum: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Length of the prefix following the sync marker.
    pub const PREFIX_LEN: usize = 8;

    /// Create a frame with correct checksums for `payload`.
    ///
    /// # Panics
    /// If `payload` is longer than `u16::MAX` bytes.
    #[must_use]
    pub fn new(id: u8, family: u8, payload: Vec<u8>) -> Self {
        assert!(payload.len() <= usize::from(u16::MAX), "payload too large");
        let mut frame = Frame {
            id,
            family,
            data_checksum: checksum(&payload),
            header_checksum: 0,
            payload,
        };
        frame.header_checksum = frame.computed_header_checksum();
        frame
    }

    /// Decode the prefix fields. Returns the frame with an empty payload and the
    /// declared payload length, or `None` if there are not enough bytes.
    #[must_use]
    pub fn decode_prefix(buf: &[u8]) -> Option<(Self, usize)> {
        if buf.len() < Self::PREFIX_LEN {
            return None;
        }
        let len = u16::from_le_bytes([buf[2], buf[3]]);
        Some((
            Frame {
                id: buf[0],
                family: buf[1],
                data_checksum: u16::from_le_bytes([buf[4], buf[5]]),
                header_checksum: u16::from_le_bytes([buf[6], buf[7]]),
                payload: Vec::default(),
            },
            usize::from(len),
        ))
    }

    // Header bytes covered by the header checksum.
    fn checked_header(&self) -> [u8; 8] {
        let len = u16::try_from(self.payload.len()).unwrap_or(u16::MAX).to_le_bytes();
        let dck = self.data_checksum.to_le_bytes();
        [
            SYNC[0], SYNC[1], self.id, self.family, len[0], len[1], dck[0], dck[1],
        ]
    }

    #[must_use]
    pub fn computed_header_checksum(&self) -> u16 {
        checksum(&self.checked_header())
    }

    #[must_use]
    pub fn computed_data_checksum(&self) -> u16 {
        checksum(&self.payload)
    }

    /// Full encoded frame, sync marker included.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SYNC.len() + Self::PREFIX_LEN + self.payload.len());
        buf.extend_from_slice(&self.checked_header());
        buf.extend_from_slice(&self.header_checksum.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Counters collected while reading frames.
#[cfg_attr(feature = "serde", derive(Serialize))]
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameStats {
    /// Number of frames produced for each record id.
    pub frames: BTreeMap<u8, usize>,
    /// Bytes discarded while looking for a sync marker.
    pub skipped_bytes: usize,
    /// Frames dropped because of a checksum mismatch.
    pub checksum_failures: usize,
    /// True if the stream ended inside a frame.
    pub truncated: bool,
}

impl FrameStats {
    #[must_use]
    pub fn total_frames(&self) -> usize {
        self.frames.values().sum()
    }
}
