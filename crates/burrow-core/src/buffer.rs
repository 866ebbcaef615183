//! Move-only packet buffers with head space.
//!
//! Every packet flowing through the core — socket to TUN or TUN to socket —
//! lives in exactly one [`Buffer`]. The type is deliberately not `Clone`:
//! a buffer is either handed onward or dropped, so "freed or forwarded
//! exactly once" holds on every branch, including every error branch, by
//! construction.
//!
//! Head space lets the send path prepend headers (method nonce and tag,
//! packet type) without copying the payload.

/// An owned packet buffer with reserved space in front of the payload.
pub struct Buffer {
    data: Vec<u8>,
    start: usize,
}

impl Buffer {
    /// Allocate a zeroed buffer of `len` payload bytes with `head_space`
    /// bytes reserved in front.
    #[must_use]
    pub fn alloc(len: usize, head_space: usize) -> Self {
        Self {
            data: vec![0u8; head_space + len],
            start: head_space,
        }
    }

    /// Allocate a buffer holding a copy of `bytes` with `head_space`
    /// reserved in front.
    #[must_use]
    pub fn from_slice(bytes: &[u8], head_space: usize) -> Self {
        let mut data = vec![0u8; head_space + bytes.len()];
        data[head_space..].copy_from_slice(bytes);
        Self {
            data,
            start: head_space,
        }
    }

    /// Payload length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() - self.start
    }

    /// Whether the payload is empty (a keepalive).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining head space.
    #[must_use]
    pub fn head_space(&self) -> usize {
        self.start
    }

    /// Grow the payload forward by `n` bytes of head space.
    ///
    /// # Panics
    ///
    /// Panics if less than `n` bytes of head space remain. Callers size
    /// buffers from `min_encrypt_head_space`, so running out indicates a
    /// programmer error, not adversary input.
    pub fn push_head(&mut self, n: usize) {
        assert!(self.start >= n, "buffer head space exhausted");
        self.start -= n;
    }

    /// Discard `n` bytes from the front of the payload.
    ///
    /// # Panics
    ///
    /// Panics if the payload is shorter than `n` bytes; length checks
    /// precede any pull on inbound paths.
    pub fn pull_head(&mut self, n: usize) {
        assert!(self.len() >= n, "pull beyond buffer length");
        self.start += n;
    }

    /// Shorten the payload to `len` bytes.
    pub fn truncate(&mut self, len: usize) {
        if len < self.len() {
            self.data.truncate(self.start + len);
        }
    }

    /// Payload as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..]
    }

    /// Payload as a mutable slice.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.start..]
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("head_space", &self.start)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_head_ops() {
        let mut buf = Buffer::alloc(4, 8);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.head_space(), 8);

        buf.push_head(3);
        assert_eq!(buf.len(), 7);
        assert_eq!(buf.head_space(), 5);

        buf.pull_head(7);
        assert!(buf.is_empty());
    }

    #[test]
    fn from_slice_copies_payload() {
        let mut buf = Buffer::from_slice(b"hello", 2);
        assert_eq!(buf.as_slice(), b"hello");
        buf.push_head(2);
        buf.as_mut_slice()[..2].copy_from_slice(b"xy");
        assert_eq!(buf.as_slice(), b"xyhello");
    }

    #[test]
    #[should_panic(expected = "head space exhausted")]
    fn push_beyond_head_space_panics() {
        let mut buf = Buffer::alloc(1, 2);
        buf.push_head(3);
    }

    #[test]
    fn truncate_shortens() {
        let mut buf = Buffer::from_slice(b"abcdef", 0);
        buf.truncate(2);
        assert_eq!(buf.as_slice(), b"ab");
        buf.truncate(10);
        assert_eq!(buf.as_slice(), b"ab");
    }
}
