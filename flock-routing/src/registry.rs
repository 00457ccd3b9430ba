//! In-memory node registry: known remote nodes and the agents they claim to
//! host (spec §4.3 step 2), plus the parent-registry resolution cache
//! (spec §4.3 step 3, §9 TTL-map note — here unbounded since entries are
//! confirmed facts, not speculative).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use flock_types::{AgentId, NodeId};

/// Derives a path-safe, unique-per-URL node id suffix. A URL is never
/// path-safe on its own (`://`, `/`, `.`), so non-`[A-Za-z0-9_-]` bytes are
/// replaced with `-` for readability and a hash of the full URL is appended
/// to keep two URLs that sanitize to the same prefix from colliding onto one
/// cached node entry.
pub fn sanitize_parent_node_id(parent_url: &str) -> String {
    let sanitized: String = parent_url
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    let mut hasher = DefaultHasher::new();
    parent_url.hash(&mut hasher);
    format!("parent-resolved-{sanitized}-{:x}", hasher.finish())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    Online,
    Offline,
}

#[derive(Clone, Debug)]
pub struct NodeEntry {
    pub node_id: NodeId,
    pub endpoint: String,
    pub status: NodeStatus,
    pub agent_ids: Vec<AgentId>,
}

/// Shared, lock-protected node table. Fine-grained (one `RwLock` over the
/// whole map, not a global lock shared with unrelated components — spec §5).
#[derive(Default)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, NodeEntry>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: NodeEntry) {
        self.nodes.write().unwrap().insert(entry.node_id.as_str().to_string(), entry);
    }

    pub fn set_status(&self, node_id: &NodeId, status: NodeStatus) {
        if let Some(entry) = self.nodes.write().unwrap().get_mut(node_id.as_str()) {
            entry.status = status;
        }
    }

    pub fn get(&self, node_id: &NodeId) -> Option<NodeEntry> {
        self.nodes.read().unwrap().get(node_id.as_str()).cloned()
    }

    /// Online nodes claiming `agent_id`, in registration order.
    pub fn find_claiming(&self, agent_id: &AgentId) -> Vec<NodeEntry> {
        self.nodes
            .read()
            .unwrap()
            .values()
            .filter(|e| e.status == NodeStatus::Online && e.agent_ids.iter().any(|a| a == agent_id))
            .cloned()
            .collect()
    }

    /// Caches a parent-resolved agent as a synthetic node entry
    /// (`nodeID = "parent-resolved-<url>"`). Subsequent lookups hit this
    /// entry without requiring the parent to be reachable again.
    pub fn cache_parent_resolved(&self, parent_url: &str, agent_id: &AgentId, endpoint: String) {
        let node_id = NodeId::new(sanitize_parent_node_id(parent_url))
            .expect("sanitized suffix is always path-safe");
        let mut nodes = self.nodes.write().unwrap();
        let entry = nodes
            .entry(node_id.as_str().to_string())
            .or_insert_with(|| NodeEntry {
                node_id: node_id.clone(),
                endpoint,
                status: NodeStatus::Online,
                agent_ids: Vec::new(),
            });
        if !entry.agent_ids.iter().any(|a| a == agent_id) {
            entry.agent_ids.push(agent_id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_claiming_ignores_offline_nodes() {
        let registry = NodeRegistry::new();
        let agent = AgentId::new("workerB").unwrap();
        registry.register(NodeEntry {
            node_id: NodeId::new("node-b").unwrap(),
            endpoint: "http://node-b".into(),
            status: NodeStatus::Offline,
            agent_ids: vec![agent.clone()],
        });
        assert!(registry.find_claiming(&agent).is_empty());
        registry.set_status(&NodeId::new("node-b").unwrap(), NodeStatus::Online);
        assert_eq!(registry.find_claiming(&agent).len(), 1);
    }

    #[test]
    fn parent_resolved_cache_is_idempotent() {
        let registry = NodeRegistry::new();
        let agent = AgentId::new("workerC").unwrap();
        registry.cache_parent_resolved("http://far", &agent, "http://far".into());
        registry.cache_parent_resolved("http://far", &agent, "http://far".into());
        assert_eq!(registry.find_claiming(&agent).len(), 1);
    }

    #[test]
    fn distinct_parent_urls_cache_to_distinct_nodes() {
        let registry = NodeRegistry::new();
        let agent_c = AgentId::new("workerC").unwrap();
        let agent_d = AgentId::new("workerD").unwrap();
        registry.cache_parent_resolved("http://far", &agent_c, "http://far/a2a/workerC".into());
        registry.cache_parent_resolved("http://other", &agent_d, "http://other/a2a/workerD".into());

        let c_nodes = registry.find_claiming(&agent_c);
        let d_nodes = registry.find_claiming(&agent_d);
        assert_eq!(c_nodes.len(), 1);
        assert_eq!(d_nodes.len(), 1);
        assert_ne!(c_nodes[0].node_id, d_nodes[0].node_id);
        assert_eq!(c_nodes[0].endpoint, "http://far/a2a/workerC");
        assert_eq!(d_nodes[0].endpoint, "http://other/a2a/workerD");
        // workerD must not resolve onto workerC's cached endpoint.
        assert!(d_nodes[0].agent_ids.iter().all(|a| a != &agent_c));
    }

    #[test]
    fn sanitized_node_id_is_path_safe_and_unique_per_url() {
        let a = sanitize_parent_node_id("http://far:9000/flock");
        let b = sanitize_parent_node_id("http://other:9000/flock");
        assert!(NodeId::new(a.clone()).is_ok());
        assert!(NodeId::new(b.clone()).is_ok());
        assert_ne!(a, b);
    }
}
