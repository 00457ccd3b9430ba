//! Per-agent thread cursors (spec §4.5, §9): `agentID -> threadID ->
//! lastSeenSeq`, updated monotonically when the agent posts or is notified.
//! A pure data structure with no coupling to the store.

use dashmap::DashMap;

use flock_types::AgentId;

#[derive(Default)]
pub struct ThreadCursors {
    agents: DashMap<String, DashMap<String, u64>>,
}

impl ThreadCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `agent_id` has seen up to `seq` on `thread_id`. Never
    /// decreases an existing cursor.
    pub fn observe(&self, agent_id: &AgentId, thread_id: &str, seq: u64) {
        let threads = self.agents.entry(agent_id.as_str().to_string()).or_default();
        let mut cursor = threads.entry(thread_id.to_string()).or_insert(0);
        if seq > *cursor {
            *cursor = seq;
        }
    }

    /// All `(thread_id, last_seen_seq)` pairs observed for an agent, sorted
    /// by thread id for deterministic output.
    pub fn threads_for(&self, agent_id: &AgentId) -> Vec<(String, u64)> {
        let Some(threads) = self.agents.get(agent_id.as_str()) else {
            return Vec::new();
        };
        let mut out: Vec<(String, u64)> = threads.iter().map(|e| (e.key().clone(), *e.value())).collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observations_are_monotone_per_thread() {
        let cursors = ThreadCursors::new();
        let agent = AgentId::new("a1").unwrap();
        cursors.observe(&agent, "c1", 5);
        cursors.observe(&agent, "c1", 3);
        assert_eq!(cursors.threads_for(&agent), vec![("c1".to_string(), 5)]);
        cursors.observe(&agent, "c1", 9);
        assert_eq!(cursors.threads_for(&agent), vec![("c1".to_string(), 9)]);
    }

    #[test]
    fn unseen_agent_has_no_threads() {
        let cursors = ThreadCursors::new();
        assert!(cursors.threads_for(&AgentId::new("ghost").unwrap()).is_empty());
    }
}
