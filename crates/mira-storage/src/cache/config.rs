//! Cache configuration.

use std::path::{Path, PathBuf};

use mira_common::constants::{
    DEFAULT_ADMISSION_PROBABILITY, DEFAULT_COLD_CAPACITY, DEFAULT_HOT_CAPACITY, DEFAULT_PAGE_SIZE,
    DEFAULT_PROMOTION_THRESHOLD, MAX_PAGE_SIZE, MIN_PAGE_SIZE,
};

/// Configuration for a [`MiraCache`](crate::cache::MiraCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Path of the backing heap file.
    pub path: PathBuf,
    /// Whether to create (and truncate) the file instead of opening an
    /// existing one.
    pub create: bool,
    /// Hot tier capacity in pages.
    pub hot_capacity: usize,
    /// Cold tier capacity in pages.
    pub cold_capacity: usize,
    /// Heat threshold above which a cold page is promoted to hot.
    pub promotion_threshold: f64,
    /// Page size in bytes.
    pub page_size: usize,
    /// Probability that a freshly materialized page is admitted
    /// directly into the hot tier.
    pub admission_probability: f64,
    /// Probability that a fetch pretends the page is not cached and
    /// re-reads it from disk. Exists to stress the I/O path; leave at 0
    /// in production.
    pub force_miss_probability: f64,
}

impl CacheConfig {
    /// Creates a configuration with default tuning for the given file.
    pub fn new(path: impl AsRef<Path>, create: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            create,
            hot_capacity: DEFAULT_HOT_CAPACITY,
            cold_capacity: DEFAULT_COLD_CAPACITY,
            promotion_threshold: DEFAULT_PROMOTION_THRESHOLD,
            page_size: DEFAULT_PAGE_SIZE,
            admission_probability: DEFAULT_ADMISSION_PROBABILITY,
            force_miss_probability: 0.0,
        }
    }

    /// Sets the tier capacities.
    pub fn with_capacities(mut self, hot: usize, cold: usize) -> Self {
        self.hot_capacity = hot;
        self.cold_capacity = cold;
        self
    }

    /// Sets the promotion threshold.
    pub fn with_promotion_threshold(mut self, threshold: f64) -> Self {
        self.promotion_threshold = threshold;
        self
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the hot-admission probability.
    pub fn with_admission_probability(mut self, probability: f64) -> Self {
        self.admission_probability = probability;
        self
    }

    /// Sets the forced-miss probability.
    pub fn with_force_miss_probability(mut self, probability: f64) -> Self {
        self.force_miss_probability = probability;
        self
    }

    /// Returns the memory budget of a full cache in bytes.
    pub fn memory_usage(&self) -> usize {
        (self.hot_capacity + self.cold_capacity) * self.page_size
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.hot_capacity == 0 {
            return Err("hot_capacity must be > 0");
        }
        if self.cold_capacity == 0 {
            return Err("cold_capacity must be > 0");
        }
        if !self.page_size.is_power_of_two() {
            return Err("page_size must be a power of 2");
        }
        if self.page_size < MIN_PAGE_SIZE {
            return Err("page_size below minimum");
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err("page_size above maximum");
        }
        if !(0.0..=1.0).contains(&self.admission_probability) {
            return Err("admission_probability must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.force_miss_probability) {
            return Err("force_miss_probability must be within [0, 1]");
        }
        // +inf is a legitimate setting: it disables promotion entirely.
        if self.promotion_threshold.is_nan() {
            return Err("promotion_threshold must not be NaN");
        }
        Ok(())
    }
}
