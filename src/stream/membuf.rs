//! In-memory ring FIFO. Connects a producer and a consumer inside the
//! process; overflow is an error, never an overwrite.

use super::{getopts, Backend, StreamState};
use crate::error::Error;
use log::warn;

pub(crate) struct MemBuf {
    buf: Vec<u8>,
    rp: usize,
    wp: usize,
    /// Bytes currently queued
    len: usize,
    state: StreamState,
    msg: String,
}

impl MemBuf {
    /// Path is the buffer size in bytes; empty uses the global default.
    pub fn open(path: &str) -> Result<Self, Error> {
        let size = if path.trim().is_empty() {
            getopts().buffsize
        } else {
            path.trim()
                .parse::<usize>()
                .map_err(|_| Error::config(format!("invalid membuf size: {path}")))?
        };
        if size == 0 {
            return Err(Error::config("membuf size must be nonzero"));
        }
        Ok(Self {
            buf: vec![0; size],
            rp: 0,
            wp: 0,
            len: 0,
            state: StreamState::Active,
            msg: String::new(),
        })
    }
}

impl Backend for MemBuf {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len);
        for b in buf.iter_mut().take(n) {
            *b = self.buf[self.rp];
            self.rp = (self.rp + 1) % self.buf.len();
        }
        self.len -= n;
        n
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        if buf.len() > self.buf.len() - self.len {
            self.state = StreamState::Error;
            self.msg = "mem-buffer overflow".into();
            warn!("membuf: overflow, {} queued, {} offered", self.len, buf.len());
            return 0;
        }
        for &b in buf {
            self.buf[self.wp] = b;
            self.wp = (self.wp + 1) % self.buf.len();
        }
        self.len += buf.len();
        buf.len()
    }

    fn state(&self) -> StreamState {
        self.state
    }

    fn message(&self) -> String {
        self.msg.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fifo_order_preserved_across_wrap() {
        let mut m = MemBuf::open("8").unwrap();
        assert_eq!(m.write(b"abcdef"), 6);
        let mut out = [0u8; 4];
        assert_eq!(m.read(&mut out), 4);
        assert_eq!(&out, b"abcd");
        // wraps around the 8 byte ring
        assert_eq!(m.write(b"ghij"), 4);
        let mut rest = [0u8; 8];
        assert_eq!(m.read(&mut rest), 6);
        assert_eq!(&rest[..6], b"efghij");
    }

    #[test]
    fn overflow_sets_error_state() {
        let mut m = MemBuf::open("4").unwrap();
        assert_eq!(m.write(b"abc"), 3);
        assert_eq!(m.write(b"de"), 0);
        assert_eq!(m.state(), StreamState::Error);
        assert!(m.message().contains("overflow"));
        // queued bytes stay readable
        let mut out = [0u8; 4];
        assert_eq!(m.read(&mut out), 3);
    }

    #[test]
    fn bad_size_is_a_configuration_error() {
        assert!(MemBuf::open("lots").is_err());
        assert!(MemBuf::open("0").is_err());
    }
}
