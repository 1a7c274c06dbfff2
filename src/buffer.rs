//! Growable byte buffers for the inbound, outbound and reassembly queues
//!
//! The connection only talks to buffers through [`ByteBuffer`], so a test or
//! an embedding application can substitute its own storage. [`GrowBuffer`] is
//! the default implementation.

use std::fmt;

/// Capability interface for a growable byte queue.
///
/// Slices returned by [`data`](ByteBuffer::data), [`data_mut`](ByteBuffer::data_mut)
/// and [`reserve`](ByteBuffer::reserve) borrow the buffer, so they cannot
/// outlive the next mutating call.
pub trait ByteBuffer {
    /// Append `data` at the end, growing the storage if needed
    fn append(&mut self, data: &[u8]);

    /// Remove the first `n` bytes, shifting the remainder to the front
    fn consume_front(&mut self, n: usize);

    /// Make room for at least `additional` bytes past the current length and
    /// return that free region. The length is unchanged until [`commit`](ByteBuffer::commit).
    fn reserve(&mut self, additional: usize) -> &mut [u8];

    /// Extend the length over `n` bytes previously written into the reserved region
    fn commit(&mut self, n: usize);

    /// Reset the length to zero, keeping the allocation
    fn clear(&mut self);

    /// Number of bytes currently stored
    fn len(&self) -> usize;

    /// Check if the buffer holds no bytes
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The stored bytes
    fn data(&self) -> &[u8];

    /// The stored bytes, writable in place
    fn data_mut(&mut self) -> &mut [u8];
}

/// Default [`ByteBuffer`] with doubling growth.
///
/// Storage is always fully initialized up to the capacity, so reserved space
/// can be handed out as a plain `&mut [u8]`.
#[derive(Clone, Default)]
pub struct GrowBuffer {
    storage: Vec<u8>,
    len: usize,
}

impl GrowBuffer {
    /// Create an empty buffer without allocating
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with `capacity` bytes preallocated
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0; capacity],
            len: 0,
        }
    }

    /// Current capacity in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Grow so that `required` bytes fit in total.
    ///
    /// Doubles the capacity, or grows to exactly `required` when doubling
    /// is not enough. Never shrinks.
    fn grow_to(&mut self, required: usize) {
        let capacity = self.capacity();
        if required <= capacity {
            return;
        }
        let new_capacity = capacity.saturating_mul(2).max(required);
        self.storage.resize(new_capacity, 0);
    }
}

impl ByteBuffer for GrowBuffer {
    fn append(&mut self, data: &[u8]) {
        let end = self.len + data.len();
        self.grow_to(end);
        self.storage[self.len..end].copy_from_slice(data);
        self.len = end;
    }

    fn consume_front(&mut self, n: usize) {
        if n >= self.len {
            self.len = 0;
            return;
        }
        self.storage.copy_within(n..self.len, 0);
        self.len -= n;
    }

    fn reserve(&mut self, additional: usize) -> &mut [u8] {
        let end = self.len + additional;
        self.grow_to(end);
        &mut self.storage[self.len..end]
    }

    fn commit(&mut self, n: usize) {
        assert!(
            self.len + n <= self.capacity(),
            "commit past reserved capacity"
        );
        self.len += n;
    }

    #[inline]
    fn clear(&mut self) {
        self.len = 0;
    }

    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn data(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    #[inline]
    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.storage[..self.len]
    }
}

impl AsRef<[u8]> for GrowBuffer {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl fmt::Debug for GrowBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrowBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}
