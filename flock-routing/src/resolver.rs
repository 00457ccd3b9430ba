//! `agentID -> LocalRoute | RemoteRoute` resolution (spec §4.3).
//!
//! Two topology factories share one `Resolve` trait: `PeerResolver` (default,
//! peer-to-peer fallback chain) and `CentralResolver` (every worker is
//! local; physical placement is a separate `resolve_sysadmin` lookup).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use flock_protocol::AgentCardDirectory;
use flock_types::{AgentId, FlockResult, NodeId};

use crate::registry::{sanitize_parent_node_id, NodeRegistry, NodeStatus};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Local,
    Remote { endpoint: String, node_id: NodeId },
}

impl Route {
    pub fn is_local(&self) -> bool {
        matches!(self, Route::Local)
    }
}

/// The local agent table a resolver consults first (spec §4.3 step 1). Kept
/// as a trait so routing doesn't depend on the concrete A2A server/executor.
pub trait LocalAgentTable: Send + Sync {
    fn contains(&self, agent_id: &AgentId) -> bool;
}

#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, agent_id: &AgentId) -> FlockResult<Route>;
}

/// Fetches `{parent}/.well-known/agent-card.json` with a fixed 10s timeout
/// (spec §4.3 step 3, §5 "remote discovery has a fixed 10s request
/// timeout"). Any failure (network, parse, missing agent) is treated as
/// "not found" and the caller falls through to the next source — spec §9
/// open question 1, resolved in `DESIGN.md`.
pub struct ParentRegistryClient {
    http: reqwest::Client,
    parent_url: String,
}

impl ParentRegistryClient {
    pub fn new(parent_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with a fixed timeout"),
            parent_url: parent_url.into(),
        }
    }

    pub fn parent_url(&self) -> &str {
        &self.parent_url
    }

    /// `Some(url)` if the parent's card directory lists `agent_id`; `None`
    /// on any failure or absence.
    pub async fn resolve_agent(&self, agent_id: &AgentId) -> Option<String> {
        let url = format!("{}/.well-known/agent-card.json", self.parent_url.trim_end_matches('/'));
        let resp = self.http.get(&url).send().await.ok()?;
        let directory: AgentCardDirectory = resp.json().await.ok()?;
        directory
            .find(agent_id.as_str())
            .map(|entry| entry.url.clone())
    }
}

/// Default topology: local table, then local node registry, then an
/// optional parent registry (cached on success), then local fallback.
pub struct PeerResolver {
    local_agents: Arc<dyn LocalAgentTable>,
    registry: Arc<NodeRegistry>,
    parent: Option<ParentRegistryClient>,
}

impl PeerResolver {
    pub fn new(
        local_agents: Arc<dyn LocalAgentTable>,
        registry: Arc<NodeRegistry>,
        parent: Option<ParentRegistryClient>,
    ) -> Self {
        Self {
            local_agents,
            registry,
            parent,
        }
    }
}

#[async_trait]
impl Resolve for PeerResolver {
    async fn resolve(&self, agent_id: &AgentId) -> FlockResult<Route> {
        // Step 1: local server agent table.
        if self.local_agents.contains(agent_id) {
            return Ok(Route::Local);
        }

        // Step 2: local node registry (cache also holds step-3 results).
        if let Some(entry) = self.registry.find_claiming(agent_id).into_iter().next() {
            return Ok(Route::Remote {
                endpoint: entry.endpoint,
                node_id: entry.node_id,
            });
        }

        // Step 3: optional parent registry, cached on success so a later
        // lookup doesn't require the parent to still be reachable.
        if let Some(parent) = &self.parent {
            if let Some(endpoint) = parent.resolve_agent(agent_id).await {
                self.registry
                    .cache_parent_resolved(parent.parent_url(), agent_id, endpoint.clone());
                let node_id = NodeId::new(sanitize_parent_node_id(parent.parent_url()))
                    .expect("sanitized suffix is always path-safe");
                return Ok(Route::Remote { endpoint, node_id });
            }
        }

        // Step 4: local fallback; the caller's local server 404s if the
        // agent truly does not exist.
        Ok(Route::Local)
    }
}

/// Looks up an agent's physical node assignment. Kept as a trait so
/// `CentralResolver` doesn't depend on `flock-store` directly.
#[async_trait]
pub trait AssignmentLookup: Send + Sync {
    async fn node_for(&self, agent_id: &AgentId) -> FlockResult<Option<NodeId>>;
}

/// Central topology: every worker lives on the central node and is always
/// `Route::Local`. `resolve_sysadmin` is the separate physical-placement
/// lookup used by administrative tooling.
pub struct CentralResolver {
    assignments: Arc<dyn AssignmentLookup>,
    registry: Arc<NodeRegistry>,
}

impl CentralResolver {
    pub fn new(assignments: Arc<dyn AssignmentLookup>, registry: Arc<NodeRegistry>) -> Self {
        Self {
            assignments,
            registry,
        }
    }

    /// Resolves the *physical* node an agent is assigned to, rather than
    /// where its session currently executes. Falls back to `Route::Local`
    /// if the assignment or the node's registry entry is missing, or the
    /// node is offline.
    pub async fn resolve_sysadmin(&self, agent_id: &AgentId) -> FlockResult<Route> {
        let Some(node_id) = self.assignments.node_for(agent_id).await? else {
            return Ok(Route::Local);
        };
        let Some(entry) = self.registry.get(&node_id) else {
            return Ok(Route::Local);
        };
        if entry.status != NodeStatus::Online {
            return Ok(Route::Local);
        }
        Ok(Route::Remote {
            endpoint: entry.endpoint,
            node_id: entry.node_id,
        })
    }
}

#[async_trait]
impl Resolve for CentralResolver {
    async fn resolve(&self, _agent_id: &AgentId) -> FlockResult<Route> {
        Ok(Route::Local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FixedTable(HashSet<String>);
    impl LocalAgentTable for FixedTable {
        fn contains(&self, agent_id: &AgentId) -> bool {
            self.0.contains(agent_id.as_str())
        }
    }

    #[tokio::test]
    async fn local_agent_wins_over_remote_claim() {
        let table = Arc::new(FixedTable(HashSet::from(["workerA".to_string()])));
        let registry = Arc::new(NodeRegistry::new());
        registry.register(crate::registry::NodeEntry {
            node_id: NodeId::new("node-z").unwrap(),
            endpoint: "http://node-z".into(),
            status: NodeStatus::Online,
            agent_ids: vec![AgentId::new("workerA").unwrap()],
        });
        let resolver = PeerResolver::new(table, registry, None);
        let route = resolver.resolve(&AgentId::new("workerA").unwrap()).await.unwrap();
        assert_eq!(route, Route::Local);
    }

    #[tokio::test]
    async fn falls_back_to_remote_node_then_local() {
        let table = Arc::new(FixedTable(HashSet::new()));
        let registry = Arc::new(NodeRegistry::new());
        registry.register(crate::registry::NodeEntry {
            node_id: NodeId::new("node-b").unwrap(),
            endpoint: "http://node-b".into(),
            status: NodeStatus::Online,
            agent_ids: vec![AgentId::new("workerB").unwrap()],
        });
        let resolver = PeerResolver::new(table, registry, None);
        let route = resolver.resolve(&AgentId::new("workerB").unwrap()).await.unwrap();
        assert_eq!(
            route,
            Route::Remote {
                endpoint: "http://node-b".into(),
                node_id: NodeId::new("node-b").unwrap()
            }
        );
        let route = resolver.resolve(&AgentId::new("workerZ").unwrap()).await.unwrap();
        assert_eq!(route, Route::Local);
    }

    struct FixedAssignments(Mutex<Option<NodeId>>);
    #[async_trait]
    impl AssignmentLookup for FixedAssignments {
        async fn node_for(&self, _agent_id: &AgentId) -> FlockResult<Option<NodeId>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn central_resolver_is_always_local_for_normal_resolve() {
        let registry = Arc::new(NodeRegistry::new());
        let assignments = Arc::new(FixedAssignments(Mutex::new(None)));
        let resolver = CentralResolver::new(assignments, registry);
        let route = resolver.resolve(&AgentId::new("worker").unwrap()).await.unwrap();
        assert_eq!(route, Route::Local);
    }

    #[tokio::test]
    async fn resolve_sysadmin_falls_back_when_node_offline() {
        let registry = Arc::new(NodeRegistry::new());
        registry.register(crate::registry::NodeEntry {
            node_id: NodeId::new("node-a").unwrap(),
            endpoint: "http://node-a".into(),
            status: NodeStatus::Offline,
            agent_ids: vec![],
        });
        let assignments = Arc::new(FixedAssignments(Mutex::new(Some(NodeId::new("node-a").unwrap()))));
        let resolver = CentralResolver::new(assignments, registry);
        let route = resolver.resolve_sysadmin(&AgentId::new("worker").unwrap()).await.unwrap();
        assert_eq!(route, Route::Local);
    }
}
