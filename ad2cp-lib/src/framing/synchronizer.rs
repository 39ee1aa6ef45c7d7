use std::io::Read;

use tracing::{trace, warn};
use typed_builder::TypedBuilder;

use super::bytes::Bytes;
use super::{Frame, FrameStats, SYNC};
use crate::prelude::*;

/// What to do with the second byte when the first sync byte matched but the second
/// did not.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ResyncPolicy {
    /// Discard both bytes and continue scanning after them. A `0xA5` in the second
    /// position is never considered as the start of a frame. This is how the
    /// instrument tooling has always read files.
    #[default]
    SkipPair,
    /// Discard only the first byte and re-examine the second.
    Rewind,
}

/// Options used when reading frames.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ReaderOpts {
    /// Drop frames whose header or payload checksum does not match.
    #[builder(default)]
    pub verify_checksums: bool,
    #[builder(default)]
    pub resync: ResyncPolicy,
}

impl Default for ReaderOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Reads [Frame]s from a byte stream.
///
/// The stream is scanned a byte at a time for the [SYNC] marker, after which the frame
/// prefix and payload are read. Bytes that are not part of a frame are skipped.
///
/// # Example
/// ```
/// use ad2cp::framing::{Frame, FrameReader};
///
/// let mut dat = vec![0x00, 0x01];
/// dat.extend(Frame::new(0xa0, 0x10, b"ID,\"AD2CP\"".to_vec()).encode());
///
/// let frames: Vec<Frame> = FrameReader::new(&dat[..]).filter_map(Result::ok).collect();
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].id, 0xa0);
/// ```
pub struct FrameReader<R>
where
    R: Read,
{
    bytes: Bytes<R>,
    opts: ReaderOpts,
    stats: FrameStats,
    done: bool,
}

impl<R> FrameReader<R>
where
    R: Read,
{
    pub fn new(reader: R) -> Self {
        Self::with_opts(reader, ReaderOpts::default())
    }

    pub fn with_opts(reader: R, opts: ReaderOpts) -> Self {
        FrameReader {
            bytes: Bytes::new(reader),
            opts,
            stats: FrameStats::default(),
            done: false,
        }
    }

    /// Offset of the next unread byte in the stream.
    pub fn offset(&self) -> usize {
        self.bytes.offset()
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn into_stats(self) -> FrameStats {
        self.stats
    }

    /// Scan the stream until the next sync marker has been consumed. Returns `false` if
    /// the stream ends first.
    ///
    /// # Errors
    /// Any non-EOF error reading the stream.
    pub fn scan(&mut self) -> Result<bool> {
        loop {
            let Some(b) = self.bytes.next()? else {
                return Ok(false);
            };
            if b != SYNC[0] {
                self.stats.skipped_bytes += 1;
                continue;
            }
            let Some(b) = self.bytes.next()? else {
                self.stats.skipped_bytes += 1;
                return Ok(false);
            };
            if b == SYNC[1] {
                return Ok(true);
            }
            match self.opts.resync {
                ResyncPolicy::SkipPair => self.stats.skipped_bytes += 2,
                ResyncPolicy::Rewind => {
                    self.stats.skipped_bytes += 1;
                    self.bytes.push(&[b]);
                }
            }
        }
    }

    // Read the prefix and payload following a sync marker.
    fn frame(&mut self) -> Result<Frame> {
        let mut prefix = [0u8; Frame::PREFIX_LEN];
        let got = self.bytes.fill(&mut prefix)?;
        if got != prefix.len() {
            return Err(Error::Truncated {
                wanted: prefix.len(),
                got,
            });
        }
        // can't fail, we have the full prefix
        let Some((mut frame, len)) = Frame::decode_prefix(&prefix) else {
            return Err(Error::NotEnoughData {
                actual: prefix.len(),
                minimum: Frame::PREFIX_LEN,
            });
        };

        frame.payload = vec![0u8; len];
        let got = self.bytes.fill(&mut frame.payload)?;
        if got != len {
            return Err(Error::Truncated { wanted: len, got });
        }
        Ok(frame)
    }

    fn verify(&mut self, frame: &Frame) -> Result<()> {
        let computed = frame.computed_header_checksum();
        if computed != frame.header_checksum {
            return Err(Error::ChecksumMismatch {
                id: frame.id,
                declared: frame.header_checksum,
                computed,
            });
        }
        let computed = frame.computed_data_checksum();
        if computed != frame.data_checksum {
            return Err(Error::ChecksumMismatch {
                id: frame.id,
                declared: frame.data_checksum,
                computed,
            });
        }
        Ok(())
    }

    /// Read the next frame, or `Ok(None)` at the end of the stream.
    ///
    /// # Errors
    /// [Error::Truncated] if the stream ends inside a frame. No more frames are produced
    /// after an error.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let zult = match self.scan() {
                Ok(true) => self.frame(),
                Ok(false) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(err) => Err(err),
            };
            let frame = match zult {
                Ok(frame) => frame,
                Err(err) => {
                    self.done = true;
                    if matches!(err, Error::Truncated { .. }) {
                        self.stats.truncated = true;
                    }
                    return Err(err);
                }
            };

            if self.opts.verify_checksums {
                if let Err(err) = self.verify(&frame) {
                    warn!(offset = self.bytes.offset(), "dropping frame: {err}");
                    self.stats.checksum_failures += 1;
                    continue;
                }
            }

            trace!(
                id = frame.id,
                len = frame.payload.len(),
                offset = self.bytes.offset(),
                "frame"
            );
            *self.stats.frames.entry(frame.id).or_default() += 1;
            return Ok(Some(frame));
        }
    }
}

impl<R> Iterator for FrameReader<R>
where
    R: Read,
{
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}
