//! # mira-common
//!
//! Common types and constants for the Mira page cache.
//!
//! This crate provides the foundational pieces shared by every Mira
//! component:
//!
//! - **Types**: the [`PageId`] identifier naming a page within a heap file
//! - **Constants**: page-size bounds, on-disk magic numbers, and the
//!   default cache tuning values
//!
//! ## Example
//!
//! ```rust
//! use mira_common::types::PageId;
//!
//! let id = PageId::new(42);
//! assert_eq!(id.as_u32(), 42);
//! assert!(id.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use types::PageId;
