//! Disk manager errors.

use crate::page::PageId;

/// Errors surfaced by a [`DiskManager`](super::DiskManager).
#[derive(Debug)]
pub enum DiskError {
    /// The page was never allocated.
    PageNotFound(PageId),

    /// A read or write buffer was not exactly one page long.
    BufferLength {
        /// Required length (`PAGE_SIZE`).
        expected: usize,
        /// Length of the buffer actually passed.
        actual: usize,
    },

    /// I/O error from the underlying file system.
    Io(std::io::Error),

    /// The backing store has an invalid shape (for example a file whose
    /// size is not a multiple of the page size).
    Corrupted(String),
}

impl std::fmt::Display for DiskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskError::PageNotFound(id) => write!(f, "page not found: {:?}", id),
            DiskError::BufferLength { expected, actual } => {
                write!(f, "bad buffer length: expected {}, got {}", expected, actual)
            }
            DiskError::Io(e) => write!(f, "I/O error: {}", e),
            DiskError::Corrupted(msg) => write!(f, "corrupted store: {}", msg),
        }
    }
}

impl std::error::Error for DiskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiskError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DiskError {
    fn from(e: std::io::Error) -> Self {
        DiskError::Io(e)
    }
}
