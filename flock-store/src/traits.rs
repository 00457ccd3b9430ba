//! Per-domain store traits (spec §4.1). Each offers `insert`, `update`,
//! `get`, `list`, and `delete`/`count` where the domain calls for it.

use std::collections::HashMap;

use async_trait::async_trait;
use flock_types::{AgentId, BridgeId, ChannelId, FlockResult, HomeId, MigrationId, NodeId};

use crate::filters::{
    AssignmentFilter, AuditFilter, BridgeFilter, ChannelFilter, ChannelMessageFilter, HomeFilter,
    MigrationTicketFilter, TransitionFilter,
};
use crate::models::{
    AgentLoopRecord, Assignment, AuditEntry, Bridge, Channel, ChannelMessage, Home, HomeState,
    HomeTransition, LoopState, MigrationPhase, MigrationTicket,
};

/// Partial update for a home row. `None` fields are left unchanged.
#[derive(Clone, Debug, Default)]
pub struct HomeUpdate {
    pub state: Option<HomeState>,
    pub lease_expires_at: Option<Option<i64>>,
    pub metadata: Option<HashMap<String, String>>,
}

#[async_trait]
pub trait HomeStore: Send + Sync {
    async fn insert(&self, home: Home) -> FlockResult<()>;
    async fn update(&self, home_id: &HomeId, update: HomeUpdate) -> FlockResult<Home>;
    async fn get(&self, home_id: &HomeId) -> FlockResult<Option<Home>>;
    async fn list(&self, filter: HomeFilter) -> FlockResult<Vec<Home>>;
}

#[async_trait]
pub trait TransitionStore: Send + Sync {
    async fn insert(&self, transition: HomeTransition) -> FlockResult<()>;
    async fn list(&self, filter: TransitionFilter) -> FlockResult<Vec<HomeTransition>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Fails with `FlockError::Duplicate` on id collision. Callers generate
    /// deterministic ids (`action-entity-timestamp`).
    async fn insert(&self, entry: AuditEntry) -> FlockResult<()>;
    async fn list(&self, filter: AuditFilter) -> FlockResult<Vec<AuditEntry>>;
}

#[derive(Clone, Debug, Default)]
pub struct ChannelUpdate {
    pub topic: Option<Option<String>>,
    pub members: Option<Vec<String>>,
    pub archived: Option<bool>,
}

#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn insert(&self, channel: Channel) -> FlockResult<()>;
    async fn update(&self, channel_id: &ChannelId, update: ChannelUpdate) -> FlockResult<Channel>;
    async fn get(&self, channel_id: &ChannelId) -> FlockResult<Option<Channel>>;
    async fn list(&self, filter: ChannelFilter) -> FlockResult<Vec<Channel>>;
}

#[async_trait]
pub trait ChannelMessageStore: Send + Sync {
    /// Atomically assigns and returns the next sequence number for the
    /// channel. Concurrent appends to the same channel must produce
    /// strictly increasing, gap-free sequence numbers.
    async fn append(
        &self,
        channel_id: &ChannelId,
        agent_id: &str,
        content: &str,
        timestamp: i64,
    ) -> FlockResult<ChannelMessage>;
    async fn list(&self, filter: ChannelMessageFilter) -> FlockResult<Vec<ChannelMessage>>;
}

#[derive(Clone, Debug, Default)]
pub struct BridgeUpdate {
    pub active: Option<bool>,
}

#[async_trait]
pub trait BridgeStore: Send + Sync {
    async fn insert(&self, bridge: Bridge) -> FlockResult<()>;
    async fn update(&self, bridge_id: &BridgeId, update: BridgeUpdate) -> FlockResult<Bridge>;
    async fn get(&self, bridge_id: &BridgeId) -> FlockResult<Option<Bridge>>;
    async fn list(&self, filter: BridgeFilter) -> FlockResult<Vec<Bridge>>;
}

#[derive(Clone, Debug, Default)]
pub struct AgentLoopUpdate {
    pub state: Option<LoopState>,
    pub last_tick_at: Option<i64>,
    pub awakened_at: Option<i64>,
    pub slept_at: Option<Option<i64>>,
    pub sleep_reason: Option<Option<String>>,
}

#[async_trait]
pub trait AgentLoopStore: Send + Sync {
    /// Idempotent: calling `init` again for an already-initialized agent is
    /// a no-op that returns the existing record.
    async fn init(&self, agent_id: &AgentId, now: i64) -> FlockResult<AgentLoopRecord>;
    async fn update(
        &self,
        agent_id: &AgentId,
        update: AgentLoopUpdate,
    ) -> FlockResult<AgentLoopRecord>;
    async fn get(&self, agent_id: &AgentId) -> FlockResult<Option<AgentLoopRecord>>;
    async fn list_awake(&self) -> FlockResult<Vec<AgentLoopRecord>>;
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn upsert(&self, assignment: Assignment) -> FlockResult<()>;
    async fn get(&self, agent_id: &AgentId) -> FlockResult<Option<Assignment>>;
    async fn list(&self, filter: AssignmentFilter) -> FlockResult<Vec<Assignment>>;
}

#[derive(Clone, Debug, Default)]
pub struct MigrationTicketUpdate {
    pub phase: Option<MigrationPhase>,
    pub error: Option<Option<String>>,
}

#[async_trait]
pub trait MigrationTicketStore: Send + Sync {
    async fn insert(&self, ticket: MigrationTicket) -> FlockResult<()>;
    async fn update(
        &self,
        migration_id: &MigrationId,
        update: MigrationTicketUpdate,
    ) -> FlockResult<MigrationTicket>;
    async fn get(&self, migration_id: &MigrationId) -> FlockResult<Option<MigrationTicket>>;
    async fn list(&self, filter: MigrationTicketFilter) -> FlockResult<Vec<MigrationTicket>>;
}

/// Aggregate bundle so callers (the server's `AppState`, the orchestrator)
/// thread one `Arc<dyn Stores>` instead of nine separate handles.
pub trait Stores: Send + Sync {
    fn homes(&self) -> &dyn HomeStore;
    fn transitions(&self) -> &dyn TransitionStore;
    fn audit(&self) -> &dyn AuditStore;
    fn channels(&self) -> &dyn ChannelStore;
    fn channel_messages(&self) -> &dyn ChannelMessageStore;
    fn bridges(&self) -> &dyn BridgeStore;
    fn agent_loops(&self) -> &dyn AgentLoopStore;
    fn assignments(&self) -> &dyn AssignmentStore;
    fn migration_tickets(&self) -> &dyn MigrationTicketStore;
}
