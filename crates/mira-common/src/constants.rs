//! System-wide constants for the Mira page cache.
//!
//! This module defines the on-disk magic numbers, page-size bounds, and
//! default cache tuning values used across the workspace.

// =============================================================================
// Page Constants
// =============================================================================

/// Default page size in bytes (4 KB).
///
/// Matches the typical OS page size and filesystem block size, so one
/// cache page maps to one unit of physical I/O.
pub const DEFAULT_PAGE_SIZE: usize = 4 * 1024;

/// Minimum supported page size in bytes.
pub const MIN_PAGE_SIZE: usize = 512;

/// Maximum supported page size in bytes (64 KB).
pub const MAX_PAGE_SIZE: usize = 64 * 1024;

// =============================================================================
// Heap File Constants
// =============================================================================

/// Magic number at offset 0 of every heap file, little-endian.
pub const HEAP_FILE_MAGIC: u32 = 0xDEAD_BEEF;

/// Size of the encoded heap file header in bytes.
///
/// The header holds the 32-bit magic and the 32-bit page count. The
/// header *region* on disk is a full page (see `HeapFile`), so page 0
/// starts at the first page-size boundary.
pub const HEAP_HEADER_ENCODED_SIZE: usize = 8;

// =============================================================================
// Cache Tuning Defaults
// =============================================================================

/// Default hot tier capacity in pages.
///
/// Small on purpose: hot slots are reserved for pages that have
/// demonstrated reuse.
pub const DEFAULT_HOT_CAPACITY: usize = 1024;

/// Default cold tier capacity in pages.
pub const DEFAULT_COLD_CAPACITY: usize = 3072;

/// Default heat threshold above which a cold page is promoted.
pub const DEFAULT_PROMOTION_THRESHOLD: f64 = 3.0;

/// Default probability that a freshly materialized page is admitted
/// directly into the hot tier.
pub const DEFAULT_ADMISSION_PROBABILITY: f64 = 0.1;

/// Minimum elapsed milliseconds used when recomputing heat, so the
/// logarithmic denominator never collapses.
pub const MIN_HEAT_INTERVAL_MS: u64 = 1;
