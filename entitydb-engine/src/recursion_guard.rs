//! Prevents instrumentation (tracing spans, metrics hooks) from
//! recursively triggering storage mutations on the same thread
//! (spec.md §5).

use std::cell::Cell;

thread_local! {
    static IN_MUTATION: Cell<bool> = const { Cell::new(false) };
}

/// RAII guard: held for the duration of a mutating repository call.
/// Entering a second mutation while one is already active on the same
/// thread is a bug in an instrumentation hook, not a legitimate
/// reentrant call, so it is rejected rather than silently nested.
pub struct RecursionGuard {
    _private: (),
}

impl RecursionGuard {
    /// Enter the guarded section. Returns `None` if already inside one
    /// on this thread.
    pub fn enter() -> Option<Self> {
        IN_MUTATION.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(RecursionGuard { _private: () })
            }
        })
    }

    pub fn is_active() -> bool {
        IN_MUTATION.with(|flag| flag.get())
    }
}

impl Drop for RecursionGuard {
    fn drop(&mut self) {
        IN_MUTATION.with(|flag| flag.set(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_enter_is_rejected() {
        let outer = RecursionGuard::enter();
        assert!(outer.is_some());
        let inner = RecursionGuard::enter();
        assert!(inner.is_none());
        drop(outer);
        assert!(RecursionGuard::enter().is_some());
    }

    #[test]
    fn guard_clears_flag_on_drop() {
        assert!(!RecursionGuard::is_active());
        {
            let _g = RecursionGuard::enter().unwrap();
            assert!(RecursionGuard::is_active());
        }
        assert!(!RecursionGuard::is_active());
    }
}
