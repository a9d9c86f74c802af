use std::error::Error;
use std::fmt;

/// Reasons a region cannot be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionError {
    /// The geometry contract is violated: `align` must be a power of two
    /// and `size` a positive multiple of it.
    Layout,
    /// The initial segment could not be allocated.
    OutOfMemory,
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionError::Layout => write!(f, "region size/alignment contract violated"),
            RegionError::OutOfMemory => write!(f, "initial segment allocation failed"),
        }
    }
}

impl Error for RegionError {}

/// Why a transaction aborted.
///
/// Aborts are silent and non-fatal: the region stays usable and the host
/// retries at its discretion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmError {
    /// The transaction observed state it cannot serialize against: a
    /// speculative read failed, a commit-time lock was contended, or
    /// read-set validation found a newer version.
    Conflict,
    /// The concurrent-committer ceiling was reached at commit admission.
    Overloaded,
}

impl fmt::Display for StmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StmError::Conflict => write!(f, "transaction conflict"),
            StmError::Overloaded => write!(f, "concurrent-committer ceiling reached"),
        }
    }
}

impl Error for StmError {}

/// Failure modes of a dynamic segment allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The segment could not be allocated.
    OutOfMemory,
    /// Allocation never interacts with the transactional protocol in this
    /// design, so this variant is never produced. It is kept so hosts can
    /// match on the full outcome set.
    Abort,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OutOfMemory => write!(f, "dynamic segment allocation failed"),
            AllocError::Abort => write!(f, "allocation aborted the transaction"),
        }
    }
}

impl Error for AllocError {}
