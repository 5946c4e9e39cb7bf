//! Bounds a read to exactly N bytes and drains the remainder on close, so
//! a caller that stops reading early never leaves unread bytes behind on
//! the underlying stream.

use std::io::{self, Read};

/// Wraps `R`, exposing only the next `limit` bytes. `close()` must be
/// called before resuming reads from the underlying stream — it discards
/// whatever of the window was left unread so the next frame stays
/// aligned.
pub struct LimitReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> LimitReader<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }

    /// Drains and discards any unread bytes of the window.
    pub fn close(&mut self) -> io::Result<()> {
        let mut sink = [0u8; 4096];
        while self.remaining > 0 {
            let want = self.remaining.min(sink.len() as u64) as usize;
            let n = self.inner.read(&mut sink[..want])?;
            if n == 0 {
                break;
            }
            self.remaining -= n as u64;
        }
        Ok(())
    }
}

impl<R: Read> Read for LimitReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(self.remaining) as usize;
        let n = self.inner.read(&mut buf[..want])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn bounds_reads_to_window() {
        let mut r = LimitReader::new(Cursor::new(b"hello world".to_vec()), 5);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn close_drains_remainder_without_partial_read() {
        let mut r = LimitReader::new(Cursor::new(b"hello world".to_vec()), 5);
        r.close().unwrap();
        // The underlying cursor should now be positioned right after the window.
        let mut rest = Vec::new();
        r.inner.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b" world");
    }

    #[test]
    fn close_after_partial_read_drains_only_the_rest() {
        let mut r = LimitReader::new(Cursor::new(b"hello world".to_vec()), 5);
        let mut buf = [0u8; 2];
        r.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"he");
        r.close().unwrap();
        let mut rest = Vec::new();
        r.inner.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b" world");
    }
}
