//! Group Expiry Timers
//!
//! One Tokio timer task per group, scheduled on the first TTL stored into it.

use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::GroupKey;

struct PendingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

// == Expiry Manager ==
/// Timer table: at most one pending expiry per group.
///
/// A timer is `Pending` from [`ExpiryManager::schedule`] until it fires or is
/// cleared. Every timer carries a generation so a task that was already
/// running when it got cleared can tell it is stale.
#[derive(Default)]
pub struct ExpiryManager {
    timers: FxHashMap<GroupKey, PendingTimer>,
    next_generation: u64,
}

impl ExpiryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key1` has a timer whose task can still fire.
    ///
    /// A task stops without firing when the runtime it was spawned on shuts
    /// down; such a timer no longer counts.
    pub fn has_timer(&self, key1: &GroupKey) -> bool {
        self.timers
            .get(key1)
            .is_some_and(|timer| !timer.handle.is_finished())
    }

    // == Schedule ==
    /// Spawns a timer that calls `on_fire` with its generation after `ttl`.
    ///
    /// No-op returning `false` if `key1` already has a live timer: the first
    /// TTL wins for the whole group. A timer orphaned by its runtime is
    /// replaced.
    pub fn schedule<F>(&mut self, key1: GroupKey, ttl: Duration, runtime: &Handle, on_fire: F) -> bool
    where
        F: FnOnce(u64) + Send + 'static,
    {
        if self.has_timer(&key1) {
            debug!(key1 = %key1, "Expiry already pending, keeping first TTL");
            return false;
        }
        if self.timers.remove(&key1).is_some() {
            debug!(key1 = %key1, "Replacing expiry timer whose runtime is gone");
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        let handle = runtime.spawn(async move {
            tokio::time::sleep(ttl).await;
            on_fire(generation);
        });

        debug!(key1 = %key1, ttl_ms = ttl.as_millis() as u64, "Scheduled group expiry");
        self.timers.insert(key1, PendingTimer { generation, handle });
        true
    }

    /// Whether `generation` is still the registered timer for `key1`.
    pub fn is_current(&self, key1: &GroupKey, generation: u64) -> bool {
        self.timers
            .get(key1)
            .is_some_and(|timer| timer.generation == generation)
    }

    // == Clear ==
    /// Drops the timer of `key1`, aborting its task when `cancel` is set.
    ///
    /// Returns whether a timer was registered.
    pub fn clear(&mut self, key1: &GroupKey, cancel: bool) -> bool {
        match self.timers.remove(key1) {
            Some(timer) => {
                if cancel {
                    timer.handle.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Aborts every pending timer.
    pub fn clear_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }

    /// Number of timers that can still fire.
    pub fn len(&self) -> usize {
        self.timers
            .values()
            .filter(|timer| !timer.handle.is_finished())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ExpiryManager {
    fn drop(&mut self) {
        self.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    fn key(name: &str) -> GroupKey {
        GroupKey::Name(name.to_string())
    }

    fn recorder() -> (Arc<Mutex<Vec<u64>>>, impl Fn() -> Box<dyn FnOnce(u64) + Send>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let make = move || {
            let sink = Arc::clone(&sink);
            Box::new(move |generation| sink.lock().push(generation)) as Box<dyn FnOnce(u64) + Send>
        };
        (fired, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_ttl() {
        let (fired, make) = recorder();
        let mut expiry = ExpiryManager::new();

        assert!(expiry.schedule(key("f"), Duration::from_millis(50), &Handle::current(), make()));
        assert!(expiry.has_timer(&key("f")));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(fired.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*fired.lock(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_ttl_wins() {
        let (fired, make) = recorder();
        let mut expiry = ExpiryManager::new();

        assert!(expiry.schedule(key("f"), Duration::from_millis(1000), &Handle::current(), make()));
        assert!(!expiry.schedule(key("f"), Duration::from_millis(10), &Handle::current(), make()));
        assert_eq!(expiry.len(), 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(fired.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(fired.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_timer() {
        let (fired, make) = recorder();
        let mut expiry = ExpiryManager::new();

        expiry.schedule(key("f"), Duration::from_millis(50), &Handle::current(), make());
        assert!(expiry.clear(&key("f"), true));
        assert!(!expiry.clear(&key("f"), true));
        assert!(expiry.is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_changes_after_reschedule() {
        let (_fired, make) = recorder();
        let mut expiry = ExpiryManager::new();

        expiry.schedule(key("f"), Duration::from_millis(50), &Handle::current(), make());
        assert!(expiry.is_current(&key("f"), 0));

        expiry.clear(&key("f"), true);
        expiry.schedule(key("f"), Duration::from_millis(50), &Handle::current(), make());
        assert!(!expiry.is_current(&key("f"), 0));
        assert!(expiry.is_current(&key("f"), 1));
    }

    #[test]
    fn test_timer_orphaned_by_runtime_shutdown_is_replaced() {
        let (fired, make) = recorder();
        let mut expiry = ExpiryManager::new();

        let first = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        assert!(expiry.schedule(key("f"), Duration::from_millis(50), first.handle(), make()));
        drop(first);

        assert!(!expiry.has_timer(&key("f")));
        assert!(expiry.is_empty());

        let second = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        assert!(expiry.schedule(key("f"), Duration::from_millis(50), second.handle(), make()));
        assert!(expiry.has_timer(&key("f")));
        assert!(!expiry.is_current(&key("f"), 0));

        second.block_on(async { tokio::time::sleep(Duration::from_millis(100)).await });
        assert_eq!(*fired.lock(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all_aborts_everything() {
        let (fired, make) = recorder();
        let mut expiry = ExpiryManager::new();

        expiry.schedule(key("a"), Duration::from_millis(10), &Handle::current(), make());
        expiry.schedule(key("b"), Duration::from_millis(20), &Handle::current(), make());
        expiry.clear_all();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fired.lock().is_empty());
        assert!(expiry.is_empty());
    }
}
