use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Default maximum number of nested frames.
pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// Default number of `__call__` indirections followed when calling a non-function value.
pub const DEFAULT_MAX_CALL_RETRIES: usize = 8;

/// Limits applied to one VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Pushing a frame beyond this depth raises `RecursionError`.
    pub max_depth: usize,
    pub max_call_retries: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_call_retries: DEFAULT_MAX_CALL_RETRIES,
        }
    }
}

impl ResourceLimits {
    #[must_use]
    pub fn max_depth(self, max_depth: usize) -> Self {
        Self { max_depth, ..self }
    }
}

/// Thread-safe handle that cancels the execution running on a VM.
///
/// The VM polls the flag on every instruction and loop step. The flag is cleared when
/// the next top-level execution starts.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones() {
        let handle = CancelHandle::default();
        let remote = handle.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(handle.is_cancelled());
        handle.reset();
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn defaults() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.max_depth, 1000);
        assert_eq!(limits.max_call_retries, 8);
        assert_eq!(limits.max_depth(50).max_depth, 50);
    }
}
