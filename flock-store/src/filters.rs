//! Declarative list filters: optional equality on indexed fields plus
//! `since`/`limit` (spec §4.1).

use flock_types::{AgentId, ChannelId, HomeId, MigrationId, NodeId};

use crate::models::{HomeState, MigrationPhase};

#[derive(Clone, Debug, Default)]
pub struct HomeFilter {
    pub agent_id: Option<AgentId>,
    pub node_id: Option<NodeId>,
    pub state: Option<HomeState>,
    pub since: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct TransitionFilter {
    pub home_id: Option<HomeId>,
    pub since: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct AuditFilter {
    pub agent_id: Option<AgentId>,
    pub home_id: Option<HomeId>,
    pub since: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct ChannelFilter {
    pub archived: Option<bool>,
    pub member: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct ChannelMessageFilter {
    pub channel_id: Option<ChannelId>,
    pub since_seq: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct BridgeFilter {
    pub channel_id: Option<ChannelId>,
    pub platform: Option<String>,
    pub external_channel_id: Option<String>,
    pub active: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct MigrationTicketFilter {
    pub agent_id: Option<AgentId>,
    pub phase: Option<MigrationPhase>,
    pub since: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct AssignmentFilter {
    pub node_id: Option<NodeId>,
    pub limit: Option<usize>,
}
