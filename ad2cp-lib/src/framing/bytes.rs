use std::io::{self, ErrorKind, Read};

/// Bytes provides the ability to read bytes from a reader and push them
/// back if they are not needed, i.e., Peek-and-push. The original order of
/// the bytes is preserved when pushing bytes back.
pub(crate) struct Bytes<R>
where
    R: Read,
{
    reader: R,
    num_read: usize,
    // stored in reverse so the next byte is always at the end
    cache: Vec<u8>,
    buf: [u8; 1],
}

impl<R> Bytes<R>
where
    R: Read,
{
    pub fn new(reader: R) -> Self {
        Bytes {
            reader,
            num_read: 0,
            cache: Vec::new(),
            buf: [0u8; 1],
        }
    }

    /// Next byte, or `Ok(None)` at the end of the stream.
    pub fn next(&mut self) -> io::Result<Option<u8>> {
        if let Some(b) = self.cache.pop() {
            return Ok(Some(b));
        }
        loop {
            match self.reader.read(&mut self.buf) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.num_read += 1;
                    return Ok(Some(self.buf[0]));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Fill `buf` from any pushed back bytes and then the reader. Returns the number of
    /// bytes filled, which is less than `buf.len()` only if the stream ended.
    pub fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.cache.pop() {
                Some(b) => {
                    buf[filled] = b;
                    filled += 1;
                }
                None => break,
            }
        }

        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    self.num_read += n;
                    filled += n;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }

    /// Push bytes back so they are produced again, in order, by the next reads.
    pub fn push(&mut self, dat: &[u8]) {
        self.cache.extend(dat.iter().rev());
    }

    /// Number of bytes consumed from the stream, not counting pushed back bytes.
    pub fn offset(&self) -> usize {
        self.num_read - self.cache.len()
    }
}
