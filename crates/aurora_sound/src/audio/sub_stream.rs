//! Byte stream plumbing
//!
//! Sound data arrives as a seekable byte stream (a file, an archive member,
//! an in-memory resource). Container headers are stripped by handing the
//! decoder a [`SubReadStream`] window over the payload.

use std::io::{self, Read, Seek, SeekFrom};

/// A randomly addressable byte stream
pub trait SeekableStream: Read + Seek + Send + Sync {
    /// Total length in bytes; leaves the read position untouched
    fn total_len(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let len = self.seek(SeekFrom::End(0))?;
        if pos != len {
            self.seek(SeekFrom::Start(pos))?;
        }
        Ok(len)
    }
}

impl<T: Read + Seek + Send + Sync + ?Sized> SeekableStream for T {}

/// A read-only window `[begin, end)` of another stream
///
/// Positions inside the window are relative to `begin`.
#[derive(Debug)]
pub struct SubReadStream<R> {
    inner: R,
    begin: u64,
    end: u64,
    pos: u64,
}

impl<R: Read + Seek> SubReadStream<R> {
    /// Create a window over `inner`, clamping `end` to the stream length
    pub fn new(mut inner: R, begin: u64, end: u64) -> io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        let end = end.min(len);
        let begin = begin.min(end);
        inner.seek(SeekFrom::Start(begin))?;

        Ok(Self {
            inner,
            begin,
            end,
            pos: 0,
        })
    }

    /// Create a window from `begin` to the end of `inner`
    pub fn from_offset(inner: R, begin: u64) -> io::Result<Self> {
        Self::new(inner, begin, u64::MAX)
    }

    /// Length of the window in bytes
    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Give back the wrapped stream
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for SubReadStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len().saturating_sub(self.pos);
        let wanted = (buf.len() as u64).min(remaining) as usize;
        if wanted == 0 {
            return Ok(0);
        }

        let read = self.inner.read(&mut buf[..wanted])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl<R: Read + Seek> Seek for SubReadStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::End(offset) => i128::from(self.len()) + i128::from(offset),
            SeekFrom::Current(offset) => i128::from(self.pos) + i128::from(offset),
        };

        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the sub stream",
            ));
        }

        let target = (target as u64).min(self.len());
        self.inner.seek(SeekFrom::Start(self.begin + target))?;
        self.pos = target;
        Ok(target)
    }
}
