//! Top-level configuration aggregating every knob from spec.md §6.

use std::path::PathBuf;

use entitydb_core::Limits;

#[derive(Debug, Clone)]
pub struct EntityDbConfig {
    /// Path to the single `.edb` file.
    pub path: PathBuf,
    pub limits: Limits,
    /// Bounded capacity of the tag variant cache (spec.md §4.7).
    pub variant_cache_capacity: usize,
}

impl EntityDbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), limits: Limits::default(), variant_cache_capacity: 4096 }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_variant_cache_capacity(mut self, capacity: usize) -> Self {
        self.variant_cache_capacity = capacity;
        self
    }
}
