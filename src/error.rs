//! Error types for the text engine.

use crate::text::MemId;
use std::collections::TryReserveError;
use std::fmt;

/// Result type alias for text engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for text engine operations.
///
/// Every fallible operation is all-or-nothing: when an `Err` is returned the
/// structure it was called on is left exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Element index beyond the valid range (`index > len` for insertion
    /// points, `index >= len` for lookups).
    OutOfRange { index: usize, len: usize },
    /// Range with `start > end` or `end > len`.
    InvalidRange { start: usize, end: usize, len: usize },
    /// Row/column pair outside the document or view.
    InvalidPosition { row: usize, col: usize },
    /// Byte offset that does not fall on a character boundary.
    NotCharBoundary(usize),
    /// Marker lookup without an index built for the current rope generation.
    StaleMarkerIndex { built_at: Option<u64>, current: u64 },
    /// Finger seeked at an older rope generation.
    StaleFinger { finger: u64, current: u64 },
    /// `start_highlights_transaction` while a transaction is already open.
    NestedTransaction,
    /// `end_highlights_transaction` without an open transaction.
    NoActiveTransaction,
    /// Memory handle unknown to this registry.
    InvalidMemId(MemId),
    /// Storage could not be grown.
    AllocationFailed { bytes: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            Self::InvalidRange { start, end, len } => {
                write!(f, "invalid range {start}..{end} for length {len}")
            }
            Self::InvalidPosition { row, col } => {
                write!(f, "position ({row}, {col}) outside document")
            }
            Self::NotCharBoundary(offset) => {
                write!(f, "byte offset {offset} is not a character boundary")
            }
            Self::StaleMarkerIndex { built_at, current } => match built_at {
                Some(built) => write!(
                    f,
                    "marker index built at generation {built} is stale (rope is at {current})"
                ),
                None => write!(f, "marker index has not been built (rope is at {current})"),
            },
            Self::StaleFinger { finger, current } => {
                write!(
                    f,
                    "finger seeked at generation {finger} is stale (rope is at {current})"
                )
            }
            Self::NestedTransaction => write!(f, "highlight transaction already active"),
            Self::NoActiveTransaction => write!(f, "no highlight transaction active"),
            Self::InvalidMemId(id) => write!(f, "unknown memory handle {id:?}"),
            Self::AllocationFailed { bytes } => {
                write!(f, "allocation of {bytes} bytes failed")
            }
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Build an [`Error::AllocationFailed`] from a failed `try_reserve`.
    pub(crate) fn alloc(_err: TryReserveError, bytes: usize) -> Self {
        Self::AllocationFailed { bytes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::OutOfRange { index: 10, len: 5 };
        assert!(err.to_string().contains("index 10"));

        let err = Error::InvalidRange {
            start: 4,
            end: 2,
            len: 8,
        };
        assert!(err.to_string().contains("4..2"));

        let err = Error::StaleMarkerIndex {
            built_at: None,
            current: 3,
        };
        assert!(err.to_string().contains("not been built"));

        let err = Error::StaleMarkerIndex {
            built_at: Some(1),
            current: 3,
        };
        assert!(err.to_string().contains("generation 1"));
    }

    #[test]
    fn test_alloc_error_conversion() {
        let mut v: Vec<u8> = Vec::new();
        let err = v.try_reserve(usize::MAX).unwrap_err();
        assert_eq!(
            Error::alloc(err, 42),
            Error::AllocationFailed { bytes: 42 }
        );
    }
}
