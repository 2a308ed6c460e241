//! Error types for heap file I/O.

use std::io;
use std::path::PathBuf;

use mira_common::types::PageId;
use thiserror::Error;

/// Result type for heap file operations.
pub type HeapResult<T> = Result<T, HeapError>;

/// Errors that can occur during heap file operations.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum HeapError {
    /// I/O failure with file and offset context.
    #[error("I/O error on {path} at offset {offset}: {source}")]
    Io {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// Failed to open or create the file.
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file header does not carry the expected magic number.
    #[error("{path} is not a heap file: bad magic {magic:#010x}")]
    BadMagic { path: PathBuf, magic: u32 },

    /// The file is too short to contain a header.
    #[error("{path} is truncated: {len} bytes is shorter than a header")]
    TruncatedHeader { path: PathBuf, len: u64 },

    /// Page id at or beyond the allocated page count.
    #[error("page {page_id} out of bounds: file holds {page_count} pages")]
    PageOutOfBounds { page_id: PageId, page_count: u32 },

    /// A read or write transferred fewer bytes than a full page.
    #[error("short {operation} on {path}: expected {expected} bytes, got {actual}")]
    ShortIo {
        operation: &'static str,
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// Buffer length does not match the file's page size.
    #[error("buffer of {actual} bytes does not match page size {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },
}

impl HeapError {
    /// Creates an I/O error with path and offset context.
    pub fn io(path: impl Into<PathBuf>, offset: u64, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            offset,
            source,
        }
    }

    /// Creates an out-of-bounds error.
    pub fn out_of_bounds(page_id: PageId, page_count: u32) -> Self {
        Self::PageOutOfBounds {
            page_id,
            page_count,
        }
    }

    /// Returns true if this error indicates a missing page.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, Self::PageOutOfBounds { .. })
    }
}
