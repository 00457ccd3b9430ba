//! Deterministic per-agent jitter (spec §4.5): a hash of the agent id mapped
//! into `[-10s, +10s]`, so two coordinators (or two runs) agree on the same
//! agent's jitter without coordination.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

const JITTER_RANGE_MS: i64 = 10_000;

/// Milliseconds in `[-10_000, 10_000]`, deterministic for a given agent id.
pub fn jitter_ms(agent_id: &str) -> i64 {
    let mut hasher = DefaultHasher::new();
    agent_id.hash(&mut hasher);
    let bucket = (hasher.finish() % (2 * JITTER_RANGE_MS as u64 + 1)) as i64;
    bucket - JITTER_RANGE_MS
}

pub fn next_tick_at(agent_id: &str, last_tick_at: i64, base_interval: Duration) -> i64 {
    last_tick_at + base_interval.as_millis() as i64 + jitter_ms(agent_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_is_bounded_and_deterministic() {
        for id in ["a1", "agent-with-a-long-name", "x"] {
            let j = jitter_ms(id);
            assert!((-JITTER_RANGE_MS..=JITTER_RANGE_MS).contains(&j));
            assert_eq!(j, jitter_ms(id));
        }
    }

    #[test]
    fn different_agents_usually_get_different_jitter() {
        let j1 = jitter_ms("agent-one");
        let j2 = jitter_ms("agent-two");
        assert_ne!(j1, j2);
    }
}
