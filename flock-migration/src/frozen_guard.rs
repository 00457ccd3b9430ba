//! Frozen guard (spec §4.6): rejects operations on an agent currently
//! mid-migration, with a phase-dependent estimated downtime.

use std::sync::Arc;

use flock_store::{MigrationTicketFilter, Stores};
use flock_types::{AgentId, FlockError, FlockResult};

use crate::phases::{estimated_downtime, is_frozen_phase};

pub struct FrozenGuard {
    stores: Arc<dyn Stores>,
}

impl FrozenGuard {
    pub fn new(stores: Arc<dyn Stores>) -> Self {
        Self { stores }
    }

    /// `Ok(())` if the agent has no in-flight migration ticket in a frozen
    /// phase; `Err(FlockError::AgentFrozen)` otherwise. Other agents, and
    /// tickets for this agent in non-frozen phases, never reject.
    pub async fn check(&self, agent_id: &AgentId) -> FlockResult<()> {
        let tickets = self
            .stores
            .migration_tickets()
            .list(MigrationTicketFilter {
                agent_id: Some(agent_id.clone()),
                ..Default::default()
            })
            .await?;
        for ticket in tickets {
            if is_frozen_phase(ticket.phase) {
                return Err(FlockError::AgentFrozen {
                    agent_id: agent_id.as_str().to_string(),
                    migration_id: ticket.migration_id.as_str().to_string(),
                    phase: ticket.phase.as_str().to_string(),
                    reason: "agent is mid-migration".to_string(),
                    estimated_downtime_ms: estimated_downtime(ticket.phase).as_millis() as u64,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flock_store::{InMemoryStores, MigrationEndpoint, MigrationPhase, MigrationTicket};
    use flock_types::{HomeId, MigrationId, NodeId};

    fn endpoint(agent: &AgentId, node: &str) -> MigrationEndpoint {
        MigrationEndpoint {
            node_id: NodeId::new(node).unwrap(),
            home_id: HomeId::new(agent, &NodeId::new(node).unwrap()),
            endpoint: format!("http://{node}"),
        }
    }

    async fn seed(stores: &Arc<dyn Stores>, agent: &AgentId, phase: MigrationPhase) {
        stores
            .migration_tickets()
            .insert(MigrationTicket {
                migration_id: MigrationId::new("m1").unwrap(),
                agent_id: agent.clone(),
                source: endpoint(agent, "n1"),
                target: endpoint(agent, "n2"),
                phase,
                reason: "rebalance".to_string(),
                created_at: 0,
                updated_at: 0,
                error: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_during_frozen_phases() {
        let stores: Arc<dyn Stores> = Arc::new(InMemoryStores::new());
        let agent = AgentId::new("a1").unwrap();
        seed(&stores, &agent, MigrationPhase::Snapshotting).await;

        let guard = FrozenGuard::new(stores);
        let err = guard.check(&agent).await.unwrap_err();
        assert_eq!(err.kind(), flock_types::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn allows_during_non_frozen_phases() {
        let stores: Arc<dyn Stores> = Arc::new(InMemoryStores::new());
        let agent = AgentId::new("a1").unwrap();
        seed(&stores, &agent, MigrationPhase::Requested).await;

        let guard = FrozenGuard::new(stores);
        assert!(guard.check(&agent).await.is_ok());
    }

    #[tokio::test]
    async fn unrelated_agents_are_unaffected() {
        let stores: Arc<dyn Stores> = Arc::new(InMemoryStores::new());
        let frozen_agent = AgentId::new("a1").unwrap();
        seed(&stores, &frozen_agent, MigrationPhase::Frozen).await;

        let guard = FrozenGuard::new(stores);
        let other = AgentId::new("a2").unwrap();
        assert!(guard.check(&other).await.is_ok());
    }
}
