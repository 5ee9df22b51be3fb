//! Buffer pool errors.

use crate::disk::DiskError;

/// Errors that can occur during buffer pool operations.
#[derive(Debug)]
pub enum BufferError {
    /// Every frame is pinned; no free frame exists and no page can be
    /// evicted. Not fatal: callers may release pins and retry.
    PoolExhausted,

    /// Underlying disk manager failure. Pool state is left consistent
    /// before this is returned.
    Disk(DiskError),
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::PoolExhausted => {
                write!(f, "no free frames available and all pages are pinned")
            }
            BufferError::Disk(e) => write!(f, "disk error: {}", e),
        }
    }
}

impl std::error::Error for BufferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BufferError::Disk(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DiskError> for BufferError {
    fn from(e: DiskError) -> Self {
        BufferError::Disk(e)
    }
}
