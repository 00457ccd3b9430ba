//! Echo tracker (spec §4.4, §9 "in-memory maps with TTL"): a short-lived
//! `(channel_id, seq) -> expires_at` map preventing a message relayed
//! inbound from a bridge from being relayed straight back out to the same
//! platform. TTL 30s, swept every 60s, lazily purged on read, with a
//! stoppable sweeper handle for clean shutdown.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use flock_types::Clock;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Default)]
struct EchoMap {
    entries: HashMap<(String, u64), i64>,
}

/// Shared, lock-protected echo map plus an optional background sweeper.
/// `dispose()` stops the sweeper; dropping the tracker without calling it
/// leaves the task running until the handle itself is dropped (the task
/// holds only a `Weak`-free `Arc` clone, so an explicit stop is needed for
/// deterministic shutdown in long-lived processes).
pub struct EchoTracker {
    map: std::sync::Arc<Mutex<EchoMap>>,
    clock: std::sync::Arc<dyn Clock>,
    ttl_ms: i64,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl EchoTracker {
    pub fn new(clock: std::sync::Arc<dyn Clock>, ttl: Duration) -> std::sync::Arc<Self> {
        let tracker = std::sync::Arc::new(Self {
            map: std::sync::Arc::new(Mutex::new(EchoMap::default())),
            clock,
            ttl_ms: ttl.as_millis() as i64,
            sweeper: Mutex::new(None),
        });
        tracker.spawn_sweeper();
        tracker
    }

    fn spawn_sweeper(self: &std::sync::Arc<Self>) {
        let map = self.map.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);
                map.lock().unwrap().entries.retain(|_, expires_at| *expires_at > now);
            }
        });
        *self.sweeper.lock().unwrap() = Some(handle);
    }

    /// Marks `(channel_id, seq)` as bridged-in, expiring `ttl` after now.
    pub fn mark_bridged_in(&self, channel_id: &str, seq: u64) {
        let expires_at = self.clock.now_ms() + self.ttl_ms;
        self.map
            .lock()
            .unwrap()
            .entries
            .insert((channel_id.to_string(), seq), expires_at);
    }

    /// True if `(channel_id, seq)` was marked and has not yet expired.
    /// Lazily purges the entry if it has.
    pub fn was_bridged_in(&self, channel_id: &str, seq: u64) -> bool {
        let now = self.clock.now_ms();
        let mut map = self.map.lock().unwrap();
        let key = (channel_id.to_string(), seq);
        match map.entries.get(&key) {
            Some(expires_at) if *expires_at > now => true,
            Some(_) => {
                map.entries.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Stops the background sweeper. Idempotent.
    pub fn dispose(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for EchoTracker {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flock_types::SystemClock;

    #[tokio::test]
    async fn marked_entry_is_true_until_ttl_then_false() {
        struct FakeClock(std::sync::atomic::AtomicI64);
        impl Clock for FakeClock {
            fn now_ms(&self) -> i64 {
                self.0.load(std::sync::atomic::Ordering::SeqCst)
            }
        }
        let clock = std::sync::Arc::new(FakeClock(std::sync::atomic::AtomicI64::new(0)));
        let tracker = EchoTracker::new(clock.clone(), Duration::from_millis(30_000));
        tracker.mark_bridged_in("c1", 1);
        assert!(tracker.was_bridged_in("c1", 1));
        clock.0.store(29_999, std::sync::atomic::Ordering::SeqCst);
        assert!(tracker.was_bridged_in("c1", 1));
        clock.0.store(30_001, std::sync::atomic::Ordering::SeqCst);
        assert!(!tracker.was_bridged_in("c1", 1));
        tracker.dispose();
    }

    #[tokio::test]
    async fn unmarked_entry_is_false() {
        let tracker = EchoTracker::new(std::sync::Arc::new(SystemClock), Duration::from_secs(30));
        assert!(!tracker.was_bridged_in("c1", 42));
        tracker.dispose();
    }
}
