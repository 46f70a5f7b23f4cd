//! Generation token guarding detached fetch threads.
//!
//! Fetch threads outlive whoever spawned them. Before publishing a result,
//! the thread compares the generation it captured at spawn against the
//! current one; teardown (or a newer song) bumps the generation and the
//! stale result is discarded instead of clobbering fresh state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct LivenessToken {
    generation: Arc<AtomicU64>,
}

impl LivenessToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current generation. Hold this across the blocking work.
    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidate all outstanding captures.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether a captured generation is still the live one.
    pub fn is_live(&self, captured: u64) -> bool {
        self.generation.load(Ordering::Acquire) == captured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_stays_live_until_invalidated() {
        let token = LivenessToken::new();
        let captured = token.current();

        assert!(token.is_live(captured));

        token.invalidate();
        assert!(!token.is_live(captured));
        assert!(token.is_live(token.current()));
    }

    #[test]
    fn test_clones_share_generation() {
        let token = LivenessToken::new();
        let clone = token.clone();
        let captured = clone.current();

        token.invalidate();
        assert!(!clone.is_live(captured));
    }

    #[test]
    fn test_stale_publisher_rejected_across_threads() {
        let token = LivenessToken::new();
        let captured = token.current();

        let worker = {
            let token = token.clone();
            std::thread::spawn(move || token.is_live(captured))
        };
        assert!(worker.join().unwrap());

        token.invalidate();
        let worker = {
            let token = token.clone();
            std::thread::spawn(move || token.is_live(captured))
        };
        assert!(!worker.join().unwrap());
    }
}
