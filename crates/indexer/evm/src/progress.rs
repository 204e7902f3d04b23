//! Sync markers shared by the live feed, replay and delayed legacy retries.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

/// Highest block whose logs have all been applied. Only moves forward.
#[derive(Debug, Default)]
pub struct BlockProgress(AtomicU64);

impl BlockProgress {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns true when `block` moved the marker.
    pub fn advance(&self, block: u64) -> bool {
        self.0.fetch_max(block, Ordering::SeqCst) < block
    }
}

/// Blocks a stop checkpoint must not move past: logs whose provider calls failed, and
/// legacy events still waiting for their community to appear.
#[derive(Debug, Default)]
pub struct ReplayFloor {
    inner: Mutex<FloorInner>,
}

#[derive(Debug, Default)]
struct FloorInner {
    held: BTreeMap<u64, usize>,
    failed: Option<u64>,
}

impl ReplayFloor {
    fn lock(&self) -> MutexGuard<'_, FloorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keeps `block` as a floor until the returned hold is dropped.
    pub fn hold(self: &Arc<Self>, block: u64) -> FloorHold {
        *self.lock().held.entry(block).or_default() += 1;
        FloorHold {
            floor: self.clone(),
            block,
        }
    }

    /// Records a block whose logs must be replayed. Cleared by [`Self::clear_failed`].
    pub fn mark_failed(&self, block: u64) {
        let mut inner = self.lock();
        inner.failed = Some(inner.failed.map_or(block, |failed| failed.min(block)));
    }

    pub fn lowest(&self) -> Option<u64> {
        let inner = self.lock();
        let held = inner.held.keys().next().copied();
        match (held, inner.failed) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Forgets failed blocks at or above a checkpoint that has been stored.
    pub fn clear_failed(&self, checkpoint: u64) {
        let mut inner = self.lock();
        if inner.failed.is_some_and(|failed| failed >= checkpoint) {
            inner.failed = None;
        }
    }

    fn release(&self, block: u64) {
        let mut inner = self.lock();
        if let Some(count) = inner.held.get_mut(&block) {
            *count -= 1;
            if *count == 0 {
                inner.held.remove(&block);
            }
        }
    }
}

#[derive(Debug)]
pub struct FloorHold {
    floor: Arc<ReplayFloor>,
    block: u64,
}

impl Drop for FloorHold {
    fn drop(&mut self) {
        self.floor.release(self.block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_only_moves_forward() {
        let progress = BlockProgress::default();

        assert!(progress.advance(10));
        assert!(!progress.advance(7));
        assert!(!progress.advance(10));
        assert_eq!(progress.get(), 10);
    }

    #[test]
    fn holds_release_on_drop() {
        let floor = Arc::new(ReplayFloor::default());
        let first = floor.hold(30);
        let second = floor.hold(30);
        let later = floor.hold(40);
        assert_eq!(floor.lowest(), Some(30));

        drop(first);
        assert_eq!(floor.lowest(), Some(30));
        drop(second);
        assert_eq!(floor.lowest(), Some(40));
        drop(later);
        assert_eq!(floor.lowest(), None);
    }

    #[test]
    fn failed_blocks_survive_until_a_checkpoint_covers_them() {
        let floor = Arc::new(ReplayFloor::default());
        floor.mark_failed(25);
        floor.mark_failed(27);
        let pending = floor.hold(20);
        assert_eq!(floor.lowest(), Some(20));

        drop(pending);
        floor.clear_failed(26);
        assert_eq!(floor.lowest(), Some(25));
        floor.clear_failed(25);
        assert_eq!(floor.lowest(), None);
    }
}
