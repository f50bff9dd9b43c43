//! Uploader identity rotation
//!
//! Chunks are pushed through a pool of uploader identities (bot tokens)
//! to spread the backend's per-identity rate and size limits. The
//! rotation policy is an injectable strategy so tests can force a
//! specific sequence.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Picks which identity serves the next upload attempt.
///
/// `next()` must be deterministic given the strategy's internal counter;
/// chunk content never influences the choice.
pub trait RotationStrategy: Send + Sync {
    /// Index of the identity to use for the next attempt
    fn next(&self) -> usize;

    /// Number of identities in the pool, for index-bounds validation
    /// at read time. Pools may grow but never shrink below a stored
    /// index.
    fn pool_size(&self) -> usize;
}

/// Round-robin rotation over a fixed-size pool.
pub struct RoundRobinRotation {
    pool_size: usize,
    counter: AtomicUsize,
}

impl RoundRobinRotation {
    pub fn new(pool_size: usize) -> Self {
        assert!(pool_size > 0, "identity pool cannot be empty");
        Self {
            pool_size,
            counter: AtomicUsize::new(0),
        }
    }
}

impl RotationStrategy for RoundRobinRotation {
    fn next(&self) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % self.pool_size
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }
}

/// Always returns the same identity. Used by tests that need to pin a
/// chunk to a known index.
pub struct PinnedRotation {
    index: usize,
    pool_size: usize,
}

impl PinnedRotation {
    pub fn new(index: usize, pool_size: usize) -> Self {
        assert!(index < pool_size);
        Self { index, pool_size }
    }
}

impl RotationStrategy for PinnedRotation {
    fn next(&self) -> usize {
        self.index
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_wraps() {
        let rotation = RoundRobinRotation::new(3);
        let picks: Vec<usize> = (0..7).map(|_| rotation.next()).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_round_robin_single_identity() {
        let rotation = RoundRobinRotation::new(1);
        assert_eq!(rotation.next(), 0);
        assert_eq!(rotation.next(), 0);
    }

    #[test]
    fn test_pinned_rotation() {
        let rotation = PinnedRotation::new(2, 4);
        assert_eq!(rotation.next(), 2);
        assert_eq!(rotation.next(), 2);
        assert_eq!(rotation.pool_size(), 4);
    }

    #[test]
    #[should_panic]
    fn test_empty_pool_rejected() {
        RoundRobinRotation::new(0);
    }
}
