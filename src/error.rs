//! Error types for rivet storage and execution operations.

use thiserror::Error;

use crate::storage::page::PageId;

/// Result type alias using [`RivetError`].
pub type Result<T> = std::result::Result<T, RivetError>;

/// Error types for rivet storage and execution operations.
#[derive(Debug, Error)]
pub enum RivetError {
    /// General storage/I/O error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Every frame in the buffer pool is pinned; nothing can be evicted.
    #[error("buffer pool error: no evictable frame available")]
    NoVictim,

    /// Unpin was called on a page whose pin count is already zero.
    #[error("invalid unpin: page {page_id} has no outstanding pins")]
    InvalidUnpin { page_id: PageId },

    /// Delete was attempted on a page that is still pinned.
    #[error("page {page_id} is pinned and cannot be deleted")]
    PageInUse { page_id: PageId },

    /// The exact key/value pair already exists in the hash index.
    #[error("duplicate key/value pair in hash index")]
    DuplicatePair,

    /// General execution errors.
    #[error("execution error: {0}")]
    Execution(String),
}
