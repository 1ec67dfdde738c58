//! Soft/hard memory thresholds that gate cache eviction and, in the
//! extreme, a graceful shutdown request (spec.md §5).
//!
//! The guardian does not sample process memory itself — callers report
//! a current usage estimate (e.g. tag variant cache size, in-memory
//! entity store size) against a configured budget, keeping this crate
//! free of platform-specific `/proc` or `mach` probing.

use std::sync::atomic::{AtomicU64, Ordering};

use entitydb_core::Limits;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Normal,
    Soft,
    Hard,
}

pub struct MemoryGuardian {
    budget_bytes: u64,
    soft_pct: u8,
    hard_pct: u8,
    current_bytes: AtomicU64,
}

impl MemoryGuardian {
    pub fn new(budget_bytes: u64, limits: &Limits) -> Self {
        Self {
            budget_bytes,
            soft_pct: limits.memory_guardian_soft_pct,
            hard_pct: limits.memory_guardian_hard_pct,
            current_bytes: AtomicU64::new(0),
        }
    }

    pub fn report_usage(&self, bytes: u64) -> MemoryPressure {
        self.current_bytes.store(bytes, Ordering::SeqCst);
        self.pressure()
    }

    pub fn pressure(&self) -> MemoryPressure {
        if self.budget_bytes == 0 {
            return MemoryPressure::Normal;
        }
        let used = self.current_bytes.load(Ordering::SeqCst);
        let pct = (used.saturating_mul(100)) / self.budget_bytes;
        if pct >= self.hard_pct as u64 {
            MemoryPressure::Hard
        } else if pct >= self.soft_pct as u64 {
            MemoryPressure::Soft
        } else {
            MemoryPressure::Normal
        }
    }

    /// Whether callers should proactively evict caches.
    pub fn should_evict(&self) -> bool {
        matches!(self.pressure(), MemoryPressure::Soft | MemoryPressure::Hard)
    }

    /// Whether the database should refuse new writes and request a
    /// graceful shutdown.
    pub fn should_refuse_writes(&self) -> bool {
        matches!(self.pressure(), MemoryPressure::Hard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> Limits {
        Limits::default()
    }

    #[test]
    fn below_soft_threshold_is_normal() {
        let g = MemoryGuardian::new(1000, &limits());
        assert_eq!(g.report_usage(500), MemoryPressure::Normal);
        assert!(!g.should_evict());
    }

    #[test]
    fn at_soft_threshold_requests_eviction_but_not_refusal() {
        let g = MemoryGuardian::new(1000, &limits());
        assert_eq!(g.report_usage(800), MemoryPressure::Soft);
        assert!(g.should_evict());
        assert!(!g.should_refuse_writes());
    }

    #[test]
    fn at_hard_threshold_refuses_writes() {
        let g = MemoryGuardian::new(1000, &limits());
        assert_eq!(g.report_usage(900), MemoryPressure::Hard);
        assert!(g.should_refuse_writes());
    }

    #[test]
    fn zero_budget_is_always_normal() {
        let g = MemoryGuardian::new(0, &limits());
        assert_eq!(g.report_usage(999_999), MemoryPressure::Normal);
    }
}
