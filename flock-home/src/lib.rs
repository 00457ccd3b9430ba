//! Home lifecycle state machine (spec §4.2): transition table enforcement,
//! lease expiry sweeping, transition/audit trail emission.

mod layout;

pub use layout::{BindMount, HomeLayout, IMMUTABLE_FILES, SEED_FILES, SUBDIRECTORIES};

use std::collections::HashMap;

use flock_store::{
    AuditEntry, AuditFilter, AuditLevel, Home, HomeFilter, HomeState, HomeTransition, HomeUpdate,
    Stores, TransitionFilter,
};
use flock_types::{AgentId, Clock, FlockError, FlockResult, HomeId, NodeId};

/// `from -> allowed-to` table from spec §4.2. `RETIRED` is terminal.
fn allowed_targets(from: HomeState) -> &'static [HomeState] {
    use HomeState::*;
    match from {
        Unassigned => &[Provisioning, Retired],
        Provisioning => &[Idle, Error],
        Idle => &[Leased, Frozen, Retired, Error],
        Leased => &[Active, Frozen, Idle, Error],
        Active => &[Leased, Frozen, Idle, Error],
        Frozen => &[Leased, Migrating, Idle, Retired, Error],
        Migrating => &[Provisioning, Frozen, Error],
        Error => &[Provisioning, Retired, Unassigned],
        Retired => &[],
    }
}

fn allowed_set_str(from: HomeState) -> String {
    allowed_targets(from)
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Audit level for a transition landing in `to`: YELLOW for FROZEN/ERROR,
/// GREEN otherwise.
fn audit_level_for(to: HomeState) -> AuditLevel {
    match to {
        HomeState::Frozen | HomeState::Error => AuditLevel::Yellow,
        _ => AuditLevel::Green,
    }
}

/// Home lifecycle service: the only writer of home rows, transition rows,
/// and the audit trail entries they generate.
pub struct HomeService {
    stores: std::sync::Arc<dyn Stores>,
    clock: std::sync::Arc<dyn Clock>,
}

impl HomeService {
    pub fn new(stores: std::sync::Arc<dyn Stores>, clock: std::sync::Arc<dyn Clock>) -> Self {
        Self { stores, clock }
    }

    pub async fn create(&self, agent_id: &AgentId, node_id: &NodeId) -> FlockResult<Home> {
        let home_id = HomeId::new(agent_id, node_id);
        let now = self.clock.now_ms();
        let home = Home {
            home_id: home_id.clone(),
            agent_id: agent_id.clone(),
            node_id: node_id.clone(),
            state: HomeState::Unassigned,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        };
        self.stores.homes().insert(home.clone()).await?;
        Ok(home)
    }

    pub async fn get(&self, home_id: &HomeId) -> FlockResult<Home> {
        self.stores
            .homes()
            .get(home_id)
            .await?
            .ok_or_else(|| FlockError::HomeNotFound(home_id.as_str().to_string()))
    }

    pub async fn list(&self, filter: HomeFilter) -> FlockResult<Vec<Home>> {
        self.stores.homes().list(filter).await
    }

    /// Moves `home_id` to `to_state`, rejecting transitions absent from the
    /// spec's table. On success: updates the home row, appends a transition
    /// row, and appends an audit entry (YELLOW for FROZEN/ERROR, else GREEN).
    pub async fn transition(
        &self,
        home_id: &HomeId,
        to_state: HomeState,
        reason: &str,
        triggered_by: &str,
    ) -> FlockResult<Home> {
        let current = self.get(home_id).await?;
        if !allowed_targets(current.state).contains(&to_state) {
            return Err(FlockError::InvalidTransition {
                home_id: home_id.as_str().to_string(),
                from: current.state.as_str().to_string(),
                to: to_state.as_str().to_string(),
                allowed: allowed_set_str(current.state),
            });
        }
        let now = self.clock.now_ms();
        // §3: leaseExpiresAt is cleared on FROZEN/RETIRED.
        let clear_lease = matches!(to_state, HomeState::Frozen | HomeState::Retired);
        let updated = self
            .stores
            .homes()
            .update(
                home_id,
                HomeUpdate {
                    state: Some(to_state),
                    lease_expires_at: if clear_lease { Some(None) } else { None },
                    metadata: None,
                },
            )
            .await?;
        self.stores
            .transitions()
            .insert(HomeTransition {
                home_id: home_id.clone(),
                timestamp: now,
                from_state: current.state,
                to_state,
                reason: reason.to_string(),
                triggered_by: triggered_by.to_string(),
            })
            .await?;
        self.stores
            .audit()
            .insert(AuditEntry {
                id: format!("transition-{}-{}", home_id.as_str(), now),
                timestamp: now,
                agent_id: Some(current.agent_id.clone()),
                home_id: Some(home_id.clone()),
                action: "home.transition".to_string(),
                level: audit_level_for(to_state),
                detail: format!(
                    "{} -> {} ({reason}, by {triggered_by})",
                    current.state, to_state
                ),
            })
            .await?;
        Ok(updated)
    }

    pub async fn set_lease_expiry(&self, home_id: &HomeId, expires_at_ms: i64) -> FlockResult<Home> {
        self.get(home_id).await?;
        self.stores
            .homes()
            .update(
                home_id,
                HomeUpdate {
                    state: None,
                    lease_expires_at: Some(Some(expires_at_ms)),
                    metadata: None,
                },
            )
            .await
    }

    /// Scans LEASED and ACTIVE homes for expired leases and transitions each
    /// to FROZEN. Returns the transitions actually applied.
    pub async fn check_lease_expiry(&self) -> FlockResult<Vec<HomeTransition>> {
        let now = self.clock.now_ms();
        let mut expired = Vec::new();
        for state in [HomeState::Leased, HomeState::Active] {
            let homes = self
                .stores
                .homes()
                .list(HomeFilter {
                    state: Some(state),
                    ..Default::default()
                })
                .await?;
            for home in homes {
                if home.lease_expires_at.map_or(false, |t| t <= now) {
                    let updated = self
                        .transition(&home.home_id, HomeState::Frozen, "lease expired", "system")
                        .await?;
                    if let Some(t) = self
                        .stores
                        .transitions()
                        .list(TransitionFilter {
                            home_id: Some(updated.home_id.clone()),
                            limit: Some(1),
                            ..Default::default()
                        })
                        .await?
                        .into_iter()
                        .last()
                    {
                        expired.push(t);
                    }
                }
            }
        }
        Ok(expired)
    }

    /// Audit entries for a home, most recent last (for diagnostics/UI).
    pub async fn audit_trail(&self, home_id: &HomeId) -> FlockResult<Vec<AuditEntry>> {
        self.stores
            .audit()
            .list(AuditFilter {
                home_id: Some(home_id.clone()),
                ..Default::default()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flock_store::InMemoryStores;
    use flock_types::SystemClock;
    use std::sync::Arc;

    fn service() -> HomeService {
        HomeService::new(
            Arc::new(InMemoryStores::new()),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn full_lifecycle_to_retired() {
        let svc = service();
        let agent = AgentId::new("a1").unwrap();
        let node = NodeId::new("n1").unwrap();
        let home = svc.create(&agent, &node).await.unwrap();
        svc.transition(&home.home_id, HomeState::Provisioning, "provisioned", "operator")
            .await
            .unwrap();
        svc.transition(&home.home_id, HomeState::Idle, "ready", "operator")
            .await
            .unwrap();
        svc.transition(&home.home_id, HomeState::Leased, "leased", "operator")
            .await
            .unwrap();
        svc.transition(&home.home_id, HomeState::Active, "activated", "operator")
            .await
            .unwrap();
        let home = svc
            .transition(&home.home_id, HomeState::Idle, "released", "operator")
            .await
            .unwrap();
        assert_eq!(home.state, HomeState::Idle);
        let retired = svc
            .transition(&home.home_id, HomeState::Retired, "decommissioned", "operator")
            .await
            .unwrap();
        assert_eq!(retired.state, HomeState::Retired);
    }

    #[tokio::test]
    async fn invalid_transition_names_states_and_allowed_set() {
        let svc = service();
        let agent = AgentId::new("a1").unwrap();
        let node = NodeId::new("n1").unwrap();
        let home = svc.create(&agent, &node).await.unwrap();
        let err = svc
            .transition(&home.home_id, HomeState::Active, "skip ahead", "operator")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("UNASSIGNED"));
        assert!(msg.contains("ACTIVE"));
        assert!(msg.contains("PROVISIONING"));
        assert_eq!(err.kind(), flock_types::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn frozen_and_error_transitions_are_yellow_audited() {
        let svc = service();
        let agent = AgentId::new("a1").unwrap();
        let node = NodeId::new("n1").unwrap();
        let home = svc.create(&agent, &node).await.unwrap();
        svc.transition(&home.home_id, HomeState::Provisioning, "x", "operator")
            .await
            .unwrap();
        svc.transition(&home.home_id, HomeState::Error, "provision failed", "system")
            .await
            .unwrap();
        let trail = svc.audit_trail(&home.home_id).await.unwrap();
        let last = trail.last().unwrap();
        assert_eq!(last.level, AuditLevel::Yellow);
    }

    #[tokio::test]
    async fn lease_expiry_sweep_freezes_stale_leases() {
        let svc = service();
        let agent = AgentId::new("a1").unwrap();
        let node = NodeId::new("n1").unwrap();
        let home = svc.create(&agent, &node).await.unwrap();
        svc.transition(&home.home_id, HomeState::Provisioning, "x", "operator")
            .await
            .unwrap();
        svc.transition(&home.home_id, HomeState::Idle, "x", "operator")
            .await
            .unwrap();
        svc.transition(&home.home_id, HomeState::Leased, "x", "operator")
            .await
            .unwrap();
        svc.set_lease_expiry(&home.home_id, 1).await.unwrap();
        let transitions = svc.check_lease_expiry().await.unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to_state, HomeState::Frozen);
        assert_eq!(transitions[0].reason, "lease expired");
        assert_eq!(transitions[0].triggered_by, "system");
        let home = svc.get(&home.home_id).await.unwrap();
        assert_eq!(home.state, HomeState::Frozen);
        assert_eq!(home.lease_expires_at, None);
    }

    #[tokio::test]
    async fn retired_clears_lease_expiry() {
        let svc = service();
        let agent = AgentId::new("a1").unwrap();
        let node = NodeId::new("n1").unwrap();
        let home = svc.create(&agent, &node).await.unwrap();
        svc.transition(&home.home_id, HomeState::Provisioning, "x", "operator")
            .await
            .unwrap();
        svc.transition(&home.home_id, HomeState::Idle, "x", "operator")
            .await
            .unwrap();
        svc.set_lease_expiry(&home.home_id, 999_999).await.unwrap();
        let home = svc
            .transition(&home.home_id, HomeState::Retired, "decommissioned", "operator")
            .await
            .unwrap();
        assert_eq!(home.lease_expires_at, None);
    }

    #[tokio::test]
    async fn retired_is_terminal() {
        let svc = service();
        let agent = AgentId::new("a1").unwrap();
        let node = NodeId::new("n1").unwrap();
        let home = svc.create(&agent, &node).await.unwrap();
        svc.transition(&home.home_id, HomeState::Retired, "decommissioned", "operator")
            .await
            .unwrap();
        let err = svc
            .transition(&home.home_id, HomeState::Provisioning, "retry", "operator")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("RETIRED"));
    }
}
