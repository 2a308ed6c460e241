//! Cache errors.

use mira_common::types::PageId;
use thiserror::Error;

use crate::heap::HeapError;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum CacheError {
    /// Requested page id is beyond the end of the heap file.
    #[error("page {page_id} not found: beyond end of heap file")]
    PageNotFound { page_id: PageId },

    /// Heap file I/O failure.
    #[error(transparent)]
    Heap(#[from] HeapError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl CacheError {
    /// Creates a page-not-found error.
    pub fn page_not_found(page_id: PageId) -> Self {
        Self::PageNotFound { page_id }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a missing page.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::PageNotFound { .. } => true,
            Self::Heap(e) => e.is_out_of_bounds(),
            Self::Config { .. } => false,
        }
    }
}
