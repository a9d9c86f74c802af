//! The transaction state machine: speculative reads, buffered writes, and
//! the two-phase commit protocol.

use std::ptr;

use crate::errors::{AllocError, StmError};
use crate::region::Region;
use crate::sets::{ReadSet, WriteSet};

/// A transaction against a [`Region`].
///
/// Reads sample the word's stripe lock before and after the copy and abort
/// on any sign of a concurrent committer; writes are buffered in the write
/// set until [`commit`](Transaction::commit) runs the locking protocol.
/// A transaction that aborted inside a read refuses all further
/// operations; drop it and begin a new one.
pub struct Transaction<'a> {
    region: &'a Region,
    is_ro: bool,
    /// Snapshot of the global version clock at begin.
    rv: u64,
    reads: ReadSet,
    writes: WriteSet,
    aborted: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(region: &'a Region, is_ro: bool) -> Self {
        Self {
            region,
            is_ro,
            rv: region.clock_version(),
            reads: ReadSet::default(),
            writes: WriteSet::new(),
            aborted: false,
        }
    }

    /// Transactional read of `size` bytes from `source` in the shared
    /// region into `target` in private memory.
    ///
    /// An `Err` aborts the transaction; `target` may then hold torn data
    /// and the handle refuses every later operation.
    ///
    /// # Safety
    ///
    /// `source` must lie within a segment owned by the region and be
    /// aligned to the region's alignment, with `size` (a multiple of the
    /// alignment) bytes readable from it. `target` must be valid for
    /// `size` bytes of writes and must not overlap the shared region.
    pub unsafe fn read(
        &mut self,
        source: *const u8,
        size: usize,
        target: *mut u8,
    ) -> Result<(), StmError> {
        if self.aborted {
            return Err(StmError::Conflict);
        }
        let align = self.region.align();
        debug_assert_eq!(size % align, 0);

        for offset in (0..size).step_by(align) {
            let src = unsafe { source.add(offset) };
            let dst = unsafe { target.add(offset) };

            if !self.is_ro {
                // Read-own-writes: a word this transaction already wrote
                // is served from the write set.
                if let Some(pending) = self.writes.get(src as usize) {
                    unsafe { ptr::copy_nonoverlapping(pending.as_ptr(), dst, align) };
                    continue;
                }
            }

            unsafe { self.read_word(src, dst) }?;

            if !self.is_ro {
                self.reads.push(src as usize);
            }
        }
        Ok(())
    }

    /// Speculatively copy one word, sampling its stripe lock before and
    /// after the copy. Inconsistent samples, a held lock, or a version
    /// past `rv` abort the transaction.
    unsafe fn read_word(&mut self, src: *const u8, dst: *mut u8) -> Result<(), StmError> {
        let stripe = self.region.stripe_for(src as usize);

        let pre = stripe.load();
        unsafe { ptr::copy_nonoverlapping(src, dst, self.region.align()) };
        let post = stripe.load();

        if pre != post || post.is_locked() || post.version() > self.rv {
            self.aborted = true;
            return Err(StmError::Conflict);
        }
        Ok(())
    }

    /// Transactional write of `size` bytes from `source` in private
    /// memory to `target` in the shared region. Purely buffered: nothing
    /// reaches shared memory before commit, and no lock is inspected.
    ///
    /// # Safety
    ///
    /// `target` must lie within a segment owned by the region and be
    /// aligned to the region's alignment, with `size` (a multiple of the
    /// alignment) bytes writable at it. `source` must be valid for `size`
    /// bytes of reads.
    pub unsafe fn write(
        &mut self,
        source: *const u8,
        size: usize,
        target: *mut u8,
    ) -> Result<(), StmError> {
        if self.aborted {
            return Err(StmError::Conflict);
        }
        let align = self.region.align();
        debug_assert_eq!(size % align, 0);

        for offset in (0..size).step_by(align) {
            let value = unsafe { std::slice::from_raw_parts(source.add(offset), align) };
            self.writes.record(unsafe { target.add(offset) } as usize, value);
        }
        Ok(())
    }

    /// Allocate a zeroed dynamic segment of `size` bytes (a positive
    /// multiple of the region's alignment) and return its base address.
    /// The segment is shared memory and lives until the region drops.
    pub fn alloc(&mut self, size: usize) -> Result<*mut u8, AllocError> {
        self.region
            .alloc_segment(size)
            .ok_or(AllocError::OutOfMemory)
    }

    /// Mark a dynamic segment for release. Deallocation is deferred to
    /// region destruction, so this is a no-op.
    pub fn free(&mut self, _target: *mut u8) -> Result<(), StmError> {
        Ok(())
    }

    /// Attempt to commit, consuming the transaction.
    ///
    /// Read-only and write-free transactions commit trivially. A writer
    /// acquires every write-set stripe, advances the global clock,
    /// validates the read set, writes back, and publishes the new version
    /// while releasing each stripe. Any failure releases all acquired
    /// stripes and reports the abort; the region is left unchanged.
    pub fn commit(self) -> Result<(), StmError> {
        if self.aborted {
            return Err(StmError::Conflict);
        }
        if self.is_ro || self.writes.is_empty() {
            return Ok(());
        }

        let region = self.region;
        if !region.admit_committer() {
            return Err(StmError::Overloaded);
        }

        let entries = self.writes.entries();

        // Acquire stripes in insertion order; on contention release the
        // acquired prefix and abort. No back-off, no retry.
        for (held, entry) in entries.iter().enumerate() {
            if !region.stripe_for(entry.addr).try_acquire() {
                for locked in &entries[..held] {
                    region.stripe_for(locked.addr).release();
                }
                region.retire_committer();
                return Err(StmError::Conflict);
            }
        }

        let wv = region.advance_clock();

        // A writer whose begin/commit window saw no other committed
        // writer holds a consistent read set by construction.
        if self.rv + 1 != wv {
            for addr in self.reads.iter() {
                let state = region.stripe_for(addr).load();
                // A word that was read and later written sits in both
                // sets; its stripe lock is held by this transaction, so
                // only the version can disqualify it. The version bits
                // are frozen while the stripe is held.
                let held_by_self = self.writes.get(addr).is_some();
                if (state.is_locked() && !held_by_self) || state.version() > self.rv {
                    for locked in entries {
                        region.stripe_for(locked.addr).release();
                    }
                    region.retire_committer();
                    return Err(StmError::Conflict);
                }
            }
        }

        // Write back and publish: each stripe's new version becomes
        // visible in the same store that clears its lock bit.
        let align = region.align();
        for entry in entries {
            unsafe {
                ptr::copy_nonoverlapping(entry.value.as_ptr(), entry.addr as *mut u8, align);
            }
            region.stripe_for(entry.addr).set_and_release(wv);
        }

        region.retire_committer();
        Ok(())
    }
}
