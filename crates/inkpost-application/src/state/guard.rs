use std::sync::atomic::{AtomicUsize, Ordering};

/// Suppresses outbound sync while a store adopts state pulled from the
/// remote backend, so the adoption never writes itself back.
///
/// The guard is a depth counter released by [`SyncGuardToken`]'s `Drop`:
/// overlapping loads on one instance each hold their own token, and an early
/// return or panic during the replacement still releases it.
#[derive(Debug, Default)]
pub struct SyncGuard {
    depth: AtomicUsize,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> SyncGuardToken<'_> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        SyncGuardToken { guard: self }
    }

    pub fn is_active(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }
}

#[must_use = "the guard is released as soon as the token is dropped"]
pub struct SyncGuardToken<'a> {
    guard: &'a SyncGuard,
}

impl Drop for SyncGuardToken<'_> {
    fn drop(&mut self) {
        self.guard.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_tokens() {
        let guard = SyncGuard::new();
        assert!(!guard.is_active());

        let outer = guard.enter();
        {
            let _inner = guard.enter();
            assert!(guard.is_active());
        }
        // The inner token finishing first must not clear the outer one.
        assert!(guard.is_active());

        drop(outer);
        assert!(!guard.is_active());
    }

    #[test]
    fn test_released_on_panic() {
        let guard = SyncGuard::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _token = guard.enter();
            panic!("replacement failed");
        }));

        assert!(result.is_err());
        assert!(!guard.is_active());
    }
}
