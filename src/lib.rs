//! Word-granular software transactional memory over a shared region.
//!
//! # Architecture
//!
//! The engine runs a TL2-style (Transactional Locking II) protocol around
//! a global version clock:
//!
//! - **Reads**: Optimistic. The word's stripe lock is sampled before and
//!   after the copy; any sign of a concurrent committer aborts the
//!   transaction, so every read a live transaction holds is consistent
//!   with committed state.
//! - **Writes**: Buffered in a per-transaction write set. No lock is
//!   touched before the commit phase.
//! - **Commit**: Acquire the write-set stripes, advance the clock,
//!   validate the read set against the snapshot taken at begin, write
//!   back, and publish the new version in the same store that releases
//!   each stripe.
//!
//! Every shared word maps to one of a fixed table of versioned spin-locks
//! by address, so distinct words may share a lock: false conflicts are
//! possible, lost updates are not.
//!
//! # Example
//!
//! ```
//! use stria::Region;
//!
//! let region = Region::new(64, 8).unwrap();
//! let word = region.start();
//!
//! let total = region.transact(false, |tx| {
//!     let mut buf = [0u8; 8];
//!     unsafe { tx.read(word, 8, buf.as_mut_ptr())? };
//!     let next = u64::from_ne_bytes(buf) + 1;
//!     unsafe { tx.write(next.to_ne_bytes().as_ptr(), 8, word)? };
//!     Ok(next)
//! });
//! assert_eq!(total, 1);
//! ```

mod errors;
mod region;
mod sets;
mod transaction;
mod vlock;

pub use errors::{AllocError, RegionError, StmError};
pub use region::{LOCK_TABLE_LEN, Region};
pub use transaction::Transaction;
