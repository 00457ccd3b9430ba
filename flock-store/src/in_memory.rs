//! In-memory store family, used for tests (spec §4.1: "at least two
//! implementations... an in-memory one used for tests, and a durable one").

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use flock_types::{AgentId, BridgeId, ChannelId, FlockError, FlockResult, HomeId, MigrationId, NodeId};

use crate::filters::{
    AssignmentFilter, AuditFilter, BridgeFilter, ChannelFilter, ChannelMessageFilter, HomeFilter,
    MigrationTicketFilter, TransitionFilter,
};
use crate::models::{
    AgentLoopRecord, Assignment, AuditEntry, Bridge, Channel, ChannelMessage, Home, LoopState,
    MigrationTicket,
};
use crate::traits::{
    AgentLoopStore, AgentLoopUpdate, AssignmentStore, AuditStore, BridgeStore, BridgeUpdate,
    ChannelMessageStore, ChannelStore, ChannelUpdate, HomeStore, HomeUpdate, MigrationTicketStore,
    MigrationTicketUpdate, Stores, TransitionStore,
};

#[derive(Default)]
pub struct InMemoryHomeStore {
    rows: Mutex<HashMap<String, Home>>,
}

#[async_trait]
impl HomeStore for InMemoryHomeStore {
    async fn insert(&self, home: Home) -> FlockResult<()> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(home.home_id.as_str()) {
            return Err(FlockError::AlreadyExists(home.home_id.as_str().to_string()));
        }
        rows.insert(home.home_id.as_str().to_string(), home);
        Ok(())
    }

    async fn update(&self, home_id: &HomeId, update: HomeUpdate) -> FlockResult<Home> {
        let mut rows = self.rows.lock().unwrap();
        let home = rows
            .get_mut(home_id.as_str())
            .ok_or_else(|| FlockError::HomeNotFound(home_id.as_str().to_string()))?;
        if let Some(state) = update.state {
            home.state = state;
        }
        if let Some(lease) = update.lease_expires_at {
            home.lease_expires_at = lease;
        }
        if let Some(metadata) = update.metadata {
            home.metadata = metadata;
        }
        Ok(home.clone())
    }

    async fn get(&self, home_id: &HomeId) -> FlockResult<Option<Home>> {
        Ok(self.rows.lock().unwrap().get(home_id.as_str()).cloned())
    }

    async fn list(&self, filter: HomeFilter) -> FlockResult<Vec<Home>> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<Home> = rows
            .values()
            .filter(|h| filter.agent_id.as_ref().map_or(true, |a| &h.agent_id == a))
            .filter(|h| filter.node_id.as_ref().map_or(true, |n| &h.node_id == n))
            .filter(|h| filter.state.map_or(true, |s| h.state == s))
            .filter(|h| filter.since.map_or(true, |s| h.updated_at >= s))
            .cloned()
            .collect();
        out.sort_by_key(|h| h.home_id.as_str().to_string());
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct InMemoryTransitionStore {
    rows: Mutex<Vec<HomeTransitionRow>>,
}

type HomeTransitionRow = crate::models::HomeTransition;

#[async_trait]
impl TransitionStore for InMemoryTransitionStore {
    async fn insert(&self, transition: HomeTransitionRow) -> FlockResult<()> {
        self.rows.lock().unwrap().push(transition);
        Ok(())
    }

    async fn list(&self, filter: TransitionFilter) -> FlockResult<Vec<HomeTransitionRow>> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<_> = rows
            .iter()
            .filter(|t| filter.home_id.as_ref().map_or(true, |h| &t.home_id == h))
            .filter(|t| filter.since.map_or(true, |s| t.timestamp >= s))
            .cloned()
            .collect();
        out.sort_by_key(|t| t.timestamp);
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct InMemoryAuditStore {
    rows: Mutex<HashMap<String, AuditEntry>>,
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn insert(&self, entry: AuditEntry) -> FlockResult<()> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&entry.id) {
            return Err(FlockError::Duplicate(entry.id));
        }
        rows.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn list(&self, filter: AuditFilter) -> FlockResult<Vec<AuditEntry>> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<_> = rows
            .values()
            .filter(|e| filter.agent_id.as_ref().map_or(true, |a| e.agent_id.as_ref() == Some(a)))
            .filter(|e| filter.home_id.as_ref().map_or(true, |h| e.home_id.as_ref() == Some(h)))
            .filter(|e| filter.since.map_or(true, |s| e.timestamp >= s))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.timestamp);
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct InMemoryChannelStore {
    rows: Mutex<HashMap<String, Channel>>,
}

#[async_trait]
impl ChannelStore for InMemoryChannelStore {
    async fn insert(&self, channel: Channel) -> FlockResult<()> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(channel.channel_id.as_str()) {
            return Err(FlockError::AlreadyExists(channel.channel_id.as_str().to_string()));
        }
        rows.insert(channel.channel_id.as_str().to_string(), channel);
        Ok(())
    }

    async fn update(&self, channel_id: &ChannelId, update: ChannelUpdate) -> FlockResult<Channel> {
        let mut rows = self.rows.lock().unwrap();
        let channel = rows
            .get_mut(channel_id.as_str())
            .ok_or_else(|| FlockError::ChannelNotFound(channel_id.as_str().to_string()))?;
        if let Some(topic) = update.topic {
            channel.topic = topic;
        }
        if let Some(members) = update.members {
            let mut deduped = Vec::new();
            for m in members {
                if !deduped.contains(&m) {
                    deduped.push(m);
                }
            }
            channel.members = deduped;
        }
        if let Some(archived) = update.archived {
            channel.archived = archived;
        }
        Ok(channel.clone())
    }

    async fn get(&self, channel_id: &ChannelId) -> FlockResult<Option<Channel>> {
        Ok(self.rows.lock().unwrap().get(channel_id.as_str()).cloned())
    }

    async fn list(&self, filter: ChannelFilter) -> FlockResult<Vec<Channel>> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<_> = rows
            .values()
            .filter(|c| filter.archived.map_or(true, |a| c.archived == a))
            .filter(|c| {
                filter
                    .member
                    .as_ref()
                    .map_or(true, |m| c.members.iter().any(|x| x == m))
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.channel_id.as_str().cmp(b.channel_id.as_str()));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct InMemoryChannelMessageStore {
    rows: Mutex<HashMap<String, Vec<ChannelMessage>>>,
}

#[async_trait]
impl ChannelMessageStore for InMemoryChannelMessageStore {
    async fn append(
        &self,
        channel_id: &ChannelId,
        agent_id: &str,
        content: &str,
        timestamp: i64,
    ) -> FlockResult<ChannelMessage> {
        let mut rows = self.rows.lock().unwrap();
        let entry = rows.entry(channel_id.as_str().to_string()).or_default();
        let seq = entry.last().map(|m| m.seq + 1).unwrap_or(1);
        let msg = ChannelMessage {
            channel_id: channel_id.clone(),
            seq,
            agent_id: agent_id.to_string(),
            content: content.to_string(),
            timestamp,
        };
        entry.push(msg.clone());
        Ok(msg)
    }

    async fn list(&self, filter: ChannelMessageFilter) -> FlockResult<Vec<ChannelMessage>> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<ChannelMessage> = match &filter.channel_id {
            Some(cid) => rows.get(cid.as_str()).cloned().unwrap_or_default(),
            None => rows.values().flatten().cloned().collect(),
        };
        out.sort_by_key(|m| (m.channel_id.as_str().to_string(), m.seq));
        if let Some(since) = filter.since_seq {
            out.retain(|m| m.seq >= since);
        }
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct InMemoryBridgeStore {
    rows: Mutex<HashMap<String, Bridge>>,
}

#[async_trait]
impl BridgeStore for InMemoryBridgeStore {
    async fn insert(&self, bridge: Bridge) -> FlockResult<()> {
        let mut rows = self.rows.lock().unwrap();
        if bridge.active {
            let collision = rows.values().any(|b| {
                b.active && b.platform == bridge.platform && b.external_channel_id == bridge.external_channel_id
            });
            if collision {
                return Err(FlockError::AlreadyExists(format!(
                    "active bridge for {}/{}",
                    bridge.platform, bridge.external_channel_id
                )));
            }
        }
        rows.insert(bridge.bridge_id.as_str().to_string(), bridge);
        Ok(())
    }

    async fn update(&self, bridge_id: &BridgeId, update: BridgeUpdate) -> FlockResult<Bridge> {
        let mut rows = self.rows.lock().unwrap();
        let bridge = rows
            .get_mut(bridge_id.as_str())
            .ok_or_else(|| FlockError::ChannelNotFound(bridge_id.as_str().to_string()))?;
        if let Some(active) = update.active {
            bridge.active = active;
        }
        Ok(bridge.clone())
    }

    async fn get(&self, bridge_id: &BridgeId) -> FlockResult<Option<Bridge>> {
        Ok(self.rows.lock().unwrap().get(bridge_id.as_str()).cloned())
    }

    async fn list(&self, filter: BridgeFilter) -> FlockResult<Vec<Bridge>> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<_> = rows
            .values()
            .filter(|b| filter.channel_id.as_ref().map_or(true, |c| &b.channel_id == c))
            .filter(|b| filter.platform.as_ref().map_or(true, |p| &b.platform == p))
            .filter(|b| {
                filter
                    .external_channel_id
                    .as_ref()
                    .map_or(true, |e| &b.external_channel_id == e)
            })
            .filter(|b| filter.active.map_or(true, |a| b.active == a))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.bridge_id.as_str().cmp(b.bridge_id.as_str()));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct InMemoryAgentLoopStore {
    rows: Mutex<HashMap<String, AgentLoopRecord>>,
}

#[async_trait]
impl AgentLoopStore for InMemoryAgentLoopStore {
    async fn init(&self, agent_id: &AgentId, now: i64) -> FlockResult<AgentLoopRecord> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.get(agent_id.as_str()) {
            return Ok(existing.clone());
        }
        let record = AgentLoopRecord {
            agent_id: agent_id.clone(),
            state: LoopState::Sleep,
            last_tick_at: now,
            awakened_at: now,
            slept_at: Some(now),
            sleep_reason: Some("initialized".to_string()),
        };
        rows.insert(agent_id.as_str().to_string(), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        agent_id: &AgentId,
        update: AgentLoopUpdate,
    ) -> FlockResult<AgentLoopRecord> {
        let mut rows = self.rows.lock().unwrap();
        let record = rows
            .get_mut(agent_id.as_str())
            .ok_or_else(|| FlockError::AgentNotFound(agent_id.as_str().to_string()))?;
        if let Some(state) = update.state {
            record.state = state;
        }
        if let Some(t) = update.last_tick_at {
            record.last_tick_at = t;
        }
        if let Some(t) = update.awakened_at {
            record.awakened_at = t;
        }
        if let Some(t) = update.slept_at {
            record.slept_at = t;
        }
        if let Some(r) = update.sleep_reason {
            record.sleep_reason = r;
        }
        Ok(record.clone())
    }

    async fn get(&self, agent_id: &AgentId) -> FlockResult<Option<AgentLoopRecord>> {
        Ok(self.rows.lock().unwrap().get(agent_id.as_str()).cloned())
    }

    async fn list_awake(&self) -> FlockResult<Vec<AgentLoopRecord>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.state == LoopState::Awake)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryAssignmentStore {
    rows: Mutex<HashMap<String, Assignment>>,
}

#[async_trait]
impl AssignmentStore for InMemoryAssignmentStore {
    async fn upsert(&self, assignment: Assignment) -> FlockResult<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(assignment.agent_id.as_str().to_string(), assignment);
        Ok(())
    }

    async fn get(&self, agent_id: &AgentId) -> FlockResult<Option<Assignment>> {
        Ok(self.rows.lock().unwrap().get(agent_id.as_str()).cloned())
    }

    async fn list(&self, filter: AssignmentFilter) -> FlockResult<Vec<Assignment>> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<_> = rows
            .values()
            .filter(|a| filter.node_id.as_ref().map_or(true, |n| &a.node_id == n))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.agent_id.as_str().cmp(b.agent_id.as_str()));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct InMemoryMigrationTicketStore {
    rows: Mutex<HashMap<String, MigrationTicket>>,
}

#[async_trait]
impl MigrationTicketStore for InMemoryMigrationTicketStore {
    async fn insert(&self, ticket: MigrationTicket) -> FlockResult<()> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(ticket.migration_id.as_str()) {
            return Err(FlockError::AlreadyExists(ticket.migration_id.as_str().to_string()));
        }
        rows.insert(ticket.migration_id.as_str().to_string(), ticket);
        Ok(())
    }

    async fn update(
        &self,
        migration_id: &MigrationId,
        update: MigrationTicketUpdate,
    ) -> FlockResult<MigrationTicket> {
        let mut rows = self.rows.lock().unwrap();
        let ticket = rows
            .get_mut(migration_id.as_str())
            .ok_or_else(|| FlockError::TicketNotFound(migration_id.as_str().to_string()))?;
        if let Some(phase) = update.phase {
            ticket.phase = phase;
        }
        if let Some(error) = update.error {
            ticket.error = error;
        }
        Ok(ticket.clone())
    }

    async fn get(&self, migration_id: &MigrationId) -> FlockResult<Option<MigrationTicket>> {
        Ok(self.rows.lock().unwrap().get(migration_id.as_str()).cloned())
    }

    async fn list(&self, filter: MigrationTicketFilter) -> FlockResult<Vec<MigrationTicket>> {
        let rows = self.rows.lock().unwrap();
        let mut out: Vec<_> = rows
            .values()
            .filter(|t| filter.agent_id.as_ref().map_or(true, |a| &t.agent_id == a))
            .filter(|t| filter.phase.map_or(true, |p| t.phase == p))
            .filter(|t| filter.since.map_or(true, |s| t.updated_at >= s))
            .cloned()
            .collect();
        out.sort_by_key(|t| t.created_at);
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

/// In-memory bundle implementing `Stores`, for tests.
#[derive(Default)]
pub struct InMemoryStores {
    homes: InMemoryHomeStore,
    transitions: InMemoryTransitionStore,
    audit: InMemoryAuditStore,
    channels: InMemoryChannelStore,
    channel_messages: InMemoryChannelMessageStore,
    bridges: InMemoryBridgeStore,
    agent_loops: InMemoryAgentLoopStore,
    assignments: InMemoryAssignmentStore,
    migration_tickets: InMemoryMigrationTicketStore,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stores for InMemoryStores {
    fn homes(&self) -> &dyn HomeStore {
        &self.homes
    }
    fn transitions(&self) -> &dyn TransitionStore {
        &self.transitions
    }
    fn audit(&self) -> &dyn AuditStore {
        &self.audit
    }
    fn channels(&self) -> &dyn ChannelStore {
        &self.channels
    }
    fn channel_messages(&self) -> &dyn ChannelMessageStore {
        &self.channel_messages
    }
    fn bridges(&self) -> &dyn BridgeStore {
        &self.bridges
    }
    fn agent_loops(&self) -> &dyn AgentLoopStore {
        &self.agent_loops
    }
    fn assignments(&self) -> &dyn AssignmentStore {
        &self.assignments
    }
    fn migration_tickets(&self) -> &dyn MigrationTicketStore {
        &self.migration_tickets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_message_append_is_gap_free_and_increasing() {
        let store = InMemoryChannelMessageStore::default();
        let cid = ChannelId::new("c1").unwrap();
        let m1 = store.append(&cid, "a", "hi", 1).await.unwrap();
        let m2 = store.append(&cid, "b", "there", 2).await.unwrap();
        assert_eq!(m1.seq, 1);
        assert_eq!(m2.seq, 2);
    }

    #[tokio::test]
    async fn audit_insert_rejects_duplicate_id() {
        let store = InMemoryAuditStore::default();
        let entry = AuditEntry {
            id: "action-entity-1".into(),
            timestamp: 1,
            agent_id: None,
            home_id: None,
            action: "action".into(),
            level: flock_types::AuditLevel::Green,
            detail: "d".into(),
        };
        store.insert(entry.clone()).await.unwrap();
        let err = store.insert(entry).await.unwrap_err();
        assert_eq!(err.kind(), flock_types::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn bridge_insert_rejects_second_active_bridge_for_same_external_channel() {
        let store = InMemoryBridgeStore::default();
        let cid = ChannelId::new("c1").unwrap();
        let b1 = Bridge {
            bridge_id: BridgeId::new("b1").unwrap(),
            channel_id: cid.clone(),
            platform: "discord".into(),
            external_channel_id: "dc-1".into(),
            active: true,
            webhook_url: None,
            account_id: None,
        };
        let mut b2 = b1.clone();
        b2.bridge_id = BridgeId::new("b2").unwrap();
        store.insert(b1).await.unwrap();
        assert!(store.insert(b2).await.is_err());
    }
}
