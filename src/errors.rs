
use thiserror::Error;

/// Structured error kinds for the k-mer graph core.
/// Several of these are control-flow signals rather than failures:
/// `AlreadyExists` is the get-or-create signal used throughout table and
/// graph insertion, and `TableFull` never escapes the tables (it triggers
/// a transparent grow-and-retry).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The key is already present; callers treat this as "get".
    #[error("entry already exists")]
    AlreadyExists,
    /// No free slot within the probe limit; tables grow and retry internally.
    #[error("hash table is full")]
    TableFull,
    /// Lookup miss; callers decide whether this is fatal.
    #[error("entry not found")]
    NotFound,
    /// The reference window repeats a k-mer more times than the cap allows.
    /// The region should be retried with a larger k.
    #[error("reference repeats a k-mer too often at k = {0}")]
    RefRepeats(u32),
    /// The region graph exceeded the bubble/path budget.
    #[error("region graph is too complex")]
    TooComplex,
    /// A variant component admits no consistent two-coloring.
    #[error("variant component cannot be two-colored")]
    CannotColor,
    /// Eliding this vertex would create a self-loop.
    #[error("vertex predecessor equals its successor")]
    PredecessorIsSuccessor,
    /// The edge a merge would create already exists.
    #[error("merged edge already exists")]
    EdgeExists,
    /// A read is shorter than the k-mer size.
    #[error("read of length {0} is shorter than k = {1}")]
    ReadTooShort(usize, u32),
}

pub type GraphResult<T> = Result<T, GraphError>;
