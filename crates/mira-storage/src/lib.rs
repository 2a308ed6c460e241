//! # mira-storage
//!
//! Tiered, heat-aware page cache over a heap file.
//!
//! This crate sits between a paged index (a B+tree, typically) and a
//! fixed-block-size backing file. It provides:
//! - a [`heap::HeapFile`] mapping dense page ids to file offsets
//! - a [`cache::MiraCache`] keeping recently used pages in memory across
//!   a small hot tier and a larger cold tier, with pin-aware eviction
//!   and dirty-page writeback
//! - the [`cache::PageCache`] trait so consumers can be tested against a
//!   trivial in-memory cache instead of a disk-backed one

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Page buffers and their locking
pub mod page;

/// Heap file management and I/O
pub mod heap;

/// The tiered page cache
pub mod cache;
