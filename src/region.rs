//! The shared memory region: initial segment, lock stripe table, global
//! version clock, admission counter, and dynamic segments.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;

use crossbeam_utils::CachePadded;

use crate::errors::{RegionError, StmError};
use crate::transaction::Transaction;
use crate::vlock::VersionLock;

/// Number of stripes in the lock table. Every shared word maps to the
/// stripe at `address % LOCK_TABLE_LEN`, so distinct words whose addresses
/// differ by a multiple of the table length alias to the same lock. False
/// conflicts are possible, lost updates are not.
pub const LOCK_TABLE_LEN: usize = 4096;

/// Default ceiling on concurrently committing writers.
pub(crate) const DEFAULT_WRITER_CEILING: usize = 64;

/// A dynamically allocated segment. Deallocation is deferred to region
/// destruction, so the block only needs its layout for the final free.
struct Segment {
    ptr: *mut u8,
    layout: Layout,
}

/// A shared memory region accessed through transactions.
///
/// The region owns one zero-filled initial segment plus any dynamic
/// segments allocated through [`Transaction::alloc`], the stripe table of
/// versioned spin-locks, and the global version clock that orders all
/// committed writers. All of it is released when the region drops; no
/// transaction may outlive it, which the borrow in [`Transaction`]
/// enforces.
pub struct Region {
    start: *mut u8,
    layout: Layout,
    locks: Box<[VersionLock]>,
    /// Global version clock. Loaded at begin, bumped by every committing
    /// writer.
    clock: CachePadded<AtomicU64>,
    /// Writers currently inside their commit phase.
    committers: CachePadded<AtomicUsize>,
    writer_ceiling: usize,
    segments: Mutex<Vec<Segment>>,
}

unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Create a region of `size` zeroed bytes, where `align` (a power of
    /// two dividing `size`) is the word size of every transactional
    /// access.
    pub fn new(size: usize, align: usize) -> Result<Self, RegionError> {
        Self::with_writer_ceiling(size, align, DEFAULT_WRITER_CEILING)
    }

    /// Like [`Region::new`] with an explicit ceiling on concurrently
    /// committing writers. A ceiling of zero rejects every writing
    /// transaction at commit.
    pub fn with_writer_ceiling(
        size: usize,
        align: usize,
        ceiling: usize,
    ) -> Result<Self, RegionError> {
        if size == 0 || !align.is_power_of_two() || size % align != 0 {
            return Err(RegionError::Layout);
        }
        let layout = Layout::from_size_align(size, align).map_err(|_| RegionError::Layout)?;
        let start = unsafe { alloc_zeroed(layout) };
        if start.is_null() {
            return Err(RegionError::OutOfMemory);
        }

        Ok(Self {
            start,
            layout,
            locks: (0..LOCK_TABLE_LEN).map(|_| VersionLock::new()).collect(),
            clock: CachePadded::new(AtomicU64::new(0)),
            committers: CachePadded::new(AtomicUsize::new(0)),
            writer_ceiling: ceiling,
            segments: Mutex::new(Vec::new()),
        })
    }

    /// Base address of the initial segment.
    pub fn start(&self) -> *mut u8 {
        self.start
    }

    /// Size of the initial segment in bytes.
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Alignment of all transactional accesses, in bytes.
    pub fn align(&self) -> usize {
        self.layout.align()
    }

    /// Begin a transaction, snapshotting the global version clock.
    pub fn begin(&self, is_ro: bool) -> Transaction<'_> {
        Transaction::new(self, is_ro)
    }

    /// Run `f` inside transactions until one commits, yielding to the
    /// scheduler between attempts. Every abort restarts `f` with a fresh
    /// transaction; side effects in `f` may therefore run several times.
    ///
    /// Reads and writes inside `f` go through the transaction's unsafe
    /// raw-pointer operations and carry their usual address preconditions.
    pub fn transact<F, T>(&self, is_ro: bool, mut f: F) -> T
    where
        F: FnMut(&mut Transaction<'_>) -> Result<T, StmError>,
    {
        loop {
            let mut tx = self.begin(is_ro);
            if let Ok(out) = f(&mut tx) {
                if tx.commit().is_ok() {
                    return out;
                }
            }
            thread::yield_now();
        }
    }

    #[inline]
    pub(crate) fn stripe_for(&self, addr: usize) -> &VersionLock {
        &self.locks[addr % LOCK_TABLE_LEN]
    }

    #[inline]
    pub(crate) fn clock_version(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Advance the clock and return the new value.
    #[inline]
    pub(crate) fn advance_clock(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Best-effort admission of a committing writer. The check and the
    /// increment are not atomic together; transient overshoot of the
    /// ceiling by racing writers is accepted.
    pub(crate) fn admit_committer(&self) -> bool {
        if self.committers.load(Ordering::Relaxed) >= self.writer_ceiling {
            return false;
        }
        self.committers.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub(crate) fn retire_committer(&self) {
        self.committers.fetch_sub(1, Ordering::Relaxed);
    }

    /// Allocate a zeroed dynamic segment and record it for release at
    /// region drop. Segments get at least pointer alignment so that
    /// pointer-sized words inside them are always aligned.
    pub(crate) fn alloc_segment(&self, size: usize) -> Option<*mut u8> {
        if size == 0 {
            return None;
        }
        let align = self.align().max(std::mem::size_of::<*mut u8>());
        let layout = Layout::from_size_align(size, align).ok()?;
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return None;
        }
        self.segments.lock().unwrap().push(Segment { ptr, layout });
        Some(ptr)
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        for segment in self.segments.get_mut().unwrap().drain(..) {
            unsafe { dealloc(segment.ptr, segment.layout) };
        }
        unsafe { dealloc(self.start, self.layout) };
    }
}
