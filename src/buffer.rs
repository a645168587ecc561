//! Buffer types for zero-copy data passing.

use crate::metadata::Metadata;
use bytes::{Bytes, BytesMut};

/// A buffer containing data and metadata.
///
/// Buffers are the primary data container passed between the element and its
/// neighbours. They consist of:
/// - A [`Bytes`] payload (reference counted, cheap to clone and slice)
/// - [`Metadata`] with timestamps, sequence number and flags
///
/// # Zero-Copy
///
/// [`Buffer::slice`] creates a view into the same allocation; only the
/// reference count is touched. [`Buffer::join`] is the one operation that
/// copies, because the result must be contiguous.
///
/// # Example
///
/// ```rust
/// use avenc::buffer::Buffer;
/// use avenc::metadata::Metadata;
///
/// let buffer = Buffer::from_vec(vec![0u8; 1024], Metadata::from_sequence(0));
/// let head = buffer.slice(0, 512);
///
/// assert_eq!(head.len(), 512);
/// assert_eq!(head.as_bytes().as_ptr(), buffer.as_bytes().as_ptr());
/// ```
#[derive(Clone)]
pub struct Buffer {
    /// The payload.
    data: Bytes,
    /// Buffer metadata.
    metadata: Metadata,
}

impl Buffer {
    /// Create a new buffer.
    pub fn new(data: Bytes, metadata: Metadata) -> Self {
        Self { data, metadata }
    }

    /// Create a buffer taking ownership of a vector.
    pub fn from_vec(data: Vec<u8>, metadata: Metadata) -> Self {
        Self::new(Bytes::from(data), metadata)
    }

    /// Create a buffer by copying a slice.
    pub fn copy_from_slice(data: &[u8], metadata: Metadata) -> Self {
        Self::new(Bytes::copy_from_slice(data), metadata)
    }

    /// Get a reference to the buffer's metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Get a mutable reference to the buffer's metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Get the buffer data as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get the shared payload handle.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Consume the buffer, returning its payload.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// Get the length of the buffer data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Create a sub-buffer (a view into a portion of this buffer).
    ///
    /// The new buffer shares the same memory and copies the metadata
    /// unchanged; callers that need per-slice timing adjust it afterwards.
    ///
    /// # Panics
    ///
    /// Panics if `offset + len > self.len()`.
    pub fn slice(&self, offset: usize, len: usize) -> Buffer {
        assert!(
            offset + len <= self.data.len(),
            "sub-buffer exceeds parent bounds"
        );
        Buffer {
            data: self.data.slice(offset..offset + len),
            metadata: self.metadata,
        }
    }

    /// Concatenate two buffers into a new contiguous buffer.
    ///
    /// The result takes the first buffer's timestamp, even when unknown, and
    /// the sum of both durations, which is unknown if either is unknown.
    pub fn join(self, other: Buffer) -> Buffer {
        let mut data = BytesMut::with_capacity(self.data.len() + other.data.len());
        data.extend_from_slice(&self.data);
        data.extend_from_slice(&other.data);

        let mut metadata = self.metadata;
        metadata.duration = self.metadata.duration + other.metadata.duration;
        metadata.offset = self.metadata.offset.or(other.metadata.offset);
        metadata.flags.eos = other.metadata.flags.eos;

        Buffer {
            data: data.freeze(),
            metadata,
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.data.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockTime;

    fn timed(data: &[u8], pts_ms: u64, dur_ms: u64) -> Buffer {
        Buffer::copy_from_slice(
            data,
            Metadata::from_pts(ClockTime::from_millis(pts_ms))
                .with_duration(ClockTime::from_millis(dur_ms)),
        )
    }

    #[test]
    fn test_buffer_basic() {
        let buffer = Buffer::from_vec(vec![1, 2, 3], Metadata::from_sequence(4));
        assert_eq!(buffer.len(), 3);
        assert!(!buffer.is_empty());
        assert_eq!(buffer.metadata().sequence, 4);
        assert_eq!(buffer.as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn test_slice_shares_memory() {
        let buffer = timed(&[0, 1, 2, 3, 4, 5], 0, 60);
        let tail = buffer.slice(2, 4);

        assert_eq!(tail.as_bytes(), &[2, 3, 4, 5]);
        assert_eq!(tail.as_bytes().as_ptr(), unsafe {
            buffer.as_bytes().as_ptr().add(2)
        });
        assert_eq!(tail.metadata().pts, ClockTime::ZERO);
    }

    #[test]
    #[should_panic(expected = "sub-buffer exceeds parent bounds")]
    fn test_slice_out_of_bounds() {
        let buffer = timed(&[0, 1], 0, 10);
        let _ = buffer.slice(1, 2);
    }

    #[test]
    fn test_join_timing() {
        let a = timed(&[1, 2], 80, 20);
        let b = timed(&[3, 4, 5], 100, 30);
        let joined = a.join(b);

        assert_eq!(joined.as_bytes(), &[1, 2, 3, 4, 5]);
        assert_eq!(joined.metadata().pts, ClockTime::from_millis(80));
        assert_eq!(joined.metadata().duration, ClockTime::from_millis(50));
    }

    #[test]
    fn test_join_unknown_duration() {
        let a = timed(&[1], 0, 10);
        let b = Buffer::copy_from_slice(&[2], Metadata::new());
        let joined = a.join(b);

        assert_eq!(joined.metadata().pts, ClockTime::ZERO);
        assert!(joined.metadata().duration.is_none());
    }

    #[test]
    fn test_join_keeps_unknown_first_pts() {
        let a = Buffer::copy_from_slice(&[1], Metadata::new());
        let b = timed(&[2], 30, 10);
        assert!(a.join(b).metadata().pts.is_none());
    }
}
