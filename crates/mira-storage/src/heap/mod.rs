//! Heap file management and I/O.
//!
//! A heap file is an append-only paged file: a small header (magic and
//! page count) followed by fixed-size page slots. Page `i` lives at
//! offset `header_size + i * page_size`, where the header region is one
//! full page so every slot stays block-aligned.
//!
//! All file access is serialized behind one internal mutex; the mutex is
//! the innermost lock in the system and is never held while cache-level
//! locks are acquired.

mod error;
mod file;
mod header;

pub use error::{HeapError, HeapResult};
pub use file::HeapFile;
pub use header::HeapHeader;
