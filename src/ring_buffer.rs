use std::alloc::Layout;
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_utils::CachePadded;
use thiserror::Error;
use tracing::{debug, trace};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Errors returned when a ring cannot be constructed
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// A ring must hold at least one sample
    #[error("sample ring capacity must be greater than zero")]
    ZeroCapacity,
    /// The backing storage for the requested capacity cannot be allocated
    #[error("sample ring capacity {capacity} is too large to allocate")]
    CapacityOverflow {
        /// Requested logical capacity
        capacity: usize,
    },
    /// Sample rate, channel count or latency describe an empty ring
    #[error("latency parameters describe a ring with no samples")]
    InvalidLatency,
}

/// Occupancy derived from a pair of indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RingState {
    /// Samples available to read
    pub(crate) fill_size: usize,
    /// Free slots available to write
    pub(crate) write_size: usize,
    /// A read starting at `read_p` may run off the end of storage
    pub(crate) read_wrap: bool,
    /// A write starting at `write_p` may run off the end of storage
    pub(crate) write_wrap: bool,
}

/// Storage and cursors shared by both sides of a ring
///
/// `write_p` is only ever stored by the writer and `read_p` only by the
/// reader. Slots in `[read_p, write_p)` (modulo `capacity + 1`) belong to the
/// reader, all other slots belong to the writer.
struct SampleRingInner {
    /// `capacity + 1` slots; the slot at `write_p` is always unoccupied
    storage: Box<[UnsafeCell<f64>]>,
    capacity: usize,
    /// Next slot to read, published by the reader
    read_p: CachePadded<AtomicUsize>,
    /// Next slot to write, published by the writer
    write_p: CachePadded<AtomicUsize>,
}

// The reader and writer touch disjoint regions of `storage`, handed over
// through Release stores and Acquire loads of the two cursors.
unsafe impl Send for SampleRingInner {}
unsafe impl Sync for SampleRingInner {}

impl std::fmt::Debug for SampleRingInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleRingInner")
            .field("capacity", &self.capacity)
            .field("read_p", &self.read_p.load(Ordering::Relaxed))
            .field("write_p", &self.write_p.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for SampleRingInner {
    fn drop(&mut self) {
        trace!(capacity = self.capacity, "sample ring released");
    }
}

impl SampleRingInner {
    fn new(capacity: usize) -> Result<Self, RingError> {
        if capacity == 0 {
            return Err(RingError::ZeroCapacity);
        }
        let slots = capacity
            .checked_add(1)
            .ok_or(RingError::CapacityOverflow { capacity })?;
        // Reject sizes the allocator would refuse before trying to allocate
        Layout::array::<f64>(slots).map_err(|_| RingError::CapacityOverflow { capacity })?;

        let storage = (0..slots).map(|_| UnsafeCell::new(0.0)).collect();

        Ok(SampleRingInner {
            storage,
            capacity,
            read_p: CachePadded::new(AtomicUsize::new(0)),
            write_p: CachePadded::new(AtomicUsize::new(0)),
        })
    }

    fn state(&self, read_p: usize, write_p: usize) -> RingState {
        let (fill_size, mut read_wrap, mut write_wrap) = if read_p < write_p {
            (write_p - read_p, false, true)
        } else if read_p > write_p {
            (self.capacity - read_p + write_p + 1, true, false)
        } else {
            (0, true, true)
        };

        // A copy starting at the origin never has to wrap
        if read_p == 0 {
            read_wrap = false;
            write_wrap = false;
        }

        RingState {
            fill_size,
            write_size: self.capacity - fill_size,
            read_wrap,
            write_wrap,
        }
    }

    fn snapshot(&self) -> RingState {
        let read_p = self.read_p.load(Ordering::Acquire);
        let write_p = self.write_p.load(Ordering::Acquire);
        self.state(read_p, write_p)
    }

    /// Pointer to the first slot, valid for `capacity + 1` elements
    fn base(&self) -> *mut f64 {
        UnsafeCell::raw_get(self.storage.as_ptr())
    }

    /// Maps an index that reached the end of storage back to the origin
    fn normalize(&self, index: usize) -> usize {
        if index == self.storage.len() {
            0
        } else {
            index
        }
    }

    /// Copies as many of `samples` as fit into free slots and publishes them
    ///
    /// # Safety
    /// Must only be called by the single writer of this ring.
    unsafe fn write(&self, samples: &[f64]) -> usize {
        let write_p = self.write_p.load(Ordering::Relaxed);
        let read_p = self.read_p.load(Ordering::Acquire);
        let state = self.state(read_p, write_p);

        let requested = samples.len().min(state.write_size);
        if requested == 0 {
            return 0;
        }

        let upper = self.capacity - write_p + 1;
        let base = self.base();
        let src = samples.as_ptr();

        // Safety: every slot touched lies in the free region between the
        // published write_p and read_p, which the reader does not access.
        let next = if state.write_wrap && requested > upper {
            let lower = requested - upper;
            unsafe {
                ptr::copy_nonoverlapping(src, base.add(write_p), upper);
                ptr::copy_nonoverlapping(src.add(upper), base, lower);
            }
            lower
        } else {
            debug_assert!(requested <= upper);
            unsafe { ptr::copy_nonoverlapping(src, base.add(write_p), requested) };
            write_p + requested
        };

        self.write_p.store(self.normalize(next), Ordering::Release);
        requested
    }

    /// Copies as many published samples as fit into `destination`
    ///
    /// # Safety
    /// Must only be called by the single reader of this ring.
    unsafe fn read(&self, destination: &mut [f64]) -> usize {
        let read_p = self.read_p.load(Ordering::Relaxed);
        let write_p = self.write_p.load(Ordering::Acquire);
        let state = self.state(read_p, write_p);

        let requested = destination.len().min(state.fill_size);
        if requested == 0 {
            return 0;
        }

        let upper = self.capacity - read_p + 1;
        let base = self.base() as *const f64;
        let dst = destination.as_mut_ptr();

        // Safety: every slot touched was published by the writer's Release
        // store of write_p, observed above with Acquire.
        let next = if state.read_wrap && requested > upper {
            let lower = requested - upper;
            unsafe {
                ptr::copy_nonoverlapping(base.add(read_p), dst, upper);
                ptr::copy_nonoverlapping(base, dst.add(upper), lower);
            }
            lower
        } else {
            debug_assert!(requested <= upper);
            unsafe { ptr::copy_nonoverlapping(base.add(read_p), dst, requested) };
            read_p + requested
        };

        self.read_p.store(self.normalize(next), Ordering::Release);
        requested
    }
}

/// Fixed-capacity ring of `f64` samples for one producer and one consumer
///
/// Used directly, both sides are driven from the owning thread. Call
/// [`SampleRing::split`] to hand the write side and the read side to two
/// different threads.
///
/// Neither [`write`](SampleRing::write) nor [`read`](SampleRing::read) ever
/// blocks, allocates or fails: each moves as many samples as currently fit
/// and returns that count, which may be zero.
#[derive(Debug)]
pub struct SampleRing {
    inner: Arc<SampleRingInner>,
}

impl SampleRing {
    /// Create an empty ring that holds up to `capacity` samples
    ///
    /// # Returns
    /// * `Err(RingError::ZeroCapacity)` if `capacity` is 0
    /// * `Err(RingError::CapacityOverflow)` if the storage cannot be allocated
    pub fn new(capacity: usize) -> Result<Self, RingError> {
        let inner = SampleRingInner::new(capacity)?;
        debug!(capacity, "sample ring created");
        Ok(SampleRing {
            inner: Arc::new(inner),
        })
    }

    /// Create a ring large enough to buffer `latency` worth of interleaved
    /// audio at `sample_rate` with `channels` channels
    ///
    /// The capacity is rounded up to a whole sample. A capacity that does not
    /// fit in `usize` saturates to `usize::MAX`, which `new` rejects.
    ///
    /// # Returns
    /// * `Err(RingError::InvalidLatency)` if the ring would hold no samples
    /// * `Err(RingError::CapacityOverflow)` if the storage cannot be allocated
    pub fn with_latency(
        sample_rate: u32,
        channels: u16,
        latency: Duration,
    ) -> Result<Self, RingError> {
        let per_second = u128::from(sample_rate) * u128::from(channels);
        let capacity = match per_second.checked_mul(latency.as_nanos()) {
            Some(0) => return Err(RingError::InvalidLatency),
            Some(total) => usize::try_from(total.div_ceil(NANOS_PER_SEC)).unwrap_or(usize::MAX),
            None => usize::MAX,
        };
        Self::new(capacity)
    }

    /// Write as many of `samples` as there is room for, returning the count
    pub fn write(&mut self, samples: &[f64]) -> usize {
        // Safety: `&mut self` makes this the only writer.
        unsafe { self.inner.write(samples) }
    }

    /// Fill the front of `destination` with buffered samples, returning the count
    pub fn read(&mut self, destination: &mut [f64]) -> usize {
        // Safety: `&mut self` makes this the only reader.
        unsafe { self.inner.read(destination) }
    }

    /// Split the ring into a write handle and a read handle
    pub fn split(self) -> (SampleWriter, SampleReader) {
        debug!(capacity = self.inner.capacity, "sample ring split");
        let writer = SampleWriter {
            inner: Arc::clone(&self.inner),
        };
        let reader = SampleReader { inner: self.inner };
        (writer, reader)
    }

    /// Maximum number of samples the ring can hold
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of samples currently available to read
    pub fn fill_size(&self) -> usize {
        self.inner.snapshot().fill_size
    }

    /// Number of free slots currently available to write
    pub fn write_size(&self) -> usize {
        self.inner.snapshot().write_size
    }

    /// Check if there is nothing to read
    pub fn is_empty(&self) -> bool {
        self.fill_size() == 0
    }

    /// Check if there is no room to write
    pub fn is_full(&self) -> bool {
        self.write_size() == 0
    }
}

/// Producer side of a split [`SampleRing`]
#[derive(Debug)]
pub struct SampleWriter {
    inner: Arc<SampleRingInner>,
}

impl SampleWriter {
    /// Write as many of `samples` as there is room for, returning the count
    ///
    /// A short count means the reader has not caught up yet.
    pub fn write(&mut self, samples: &[f64]) -> usize {
        // Safety: the writer handle is unique and not `Clone`.
        unsafe { self.inner.write(samples) }
    }

    /// Maximum number of samples the ring can hold
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Samples waiting to be read; may shrink concurrently
    pub fn fill_size(&self) -> usize {
        self.inner.snapshot().fill_size
    }

    /// Free slots; may grow concurrently, never shrinks behind the writer's back
    pub fn write_size(&self) -> usize {
        self.inner.snapshot().write_size
    }

    /// Check if there is nothing to read
    pub fn is_empty(&self) -> bool {
        self.fill_size() == 0
    }

    /// Check if there is no room to write
    pub fn is_full(&self) -> bool {
        self.write_size() == 0
    }

    /// Check if the reader has been dropped
    pub fn is_abandoned(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }
}

impl Drop for SampleWriter {
    fn drop(&mut self) {
        trace!(fill_size = self.fill_size(), "sample writer dropped");
    }
}

/// Consumer side of a split [`SampleRing`]
#[derive(Debug)]
pub struct SampleReader {
    inner: Arc<SampleRingInner>,
}

impl SampleReader {
    /// Fill the front of `destination` with buffered samples, returning the count
    ///
    /// Slots of `destination` past the returned count are left untouched.
    pub fn read(&mut self, destination: &mut [f64]) -> usize {
        // Safety: the reader handle is unique and not `Clone`.
        unsafe { self.inner.read(destination) }
    }

    /// Maximum number of samples the ring can hold
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Samples available; may grow concurrently, never shrinks behind the reader's back
    pub fn fill_size(&self) -> usize {
        self.inner.snapshot().fill_size
    }

    /// Free slots; may shrink concurrently
    pub fn write_size(&self) -> usize {
        self.inner.snapshot().write_size
    }

    /// Check if there is nothing to read
    pub fn is_empty(&self) -> bool {
        self.fill_size() == 0
    }

    /// Check if there is no room to write
    pub fn is_full(&self) -> bool {
        self.write_size() == 0
    }

    /// Check if the writer has been dropped
    pub fn is_abandoned(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }
}

impl Drop for SampleReader {
    fn drop(&mut self) {
        trace!(fill_size = self.fill_size(), "sample reader dropped");
    }
}
