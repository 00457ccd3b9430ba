//! Domain record types shared by every store implementation (spec §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use flock_types::{AgentId, AuditLevel, BridgeId, ChannelId, HomeId, MigrationId, NodeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HomeState {
    Unassigned,
    Provisioning,
    Idle,
    Leased,
    Active,
    Frozen,
    Migrating,
    Error,
    Retired,
}

impl HomeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HomeState::Unassigned => "UNASSIGNED",
            HomeState::Provisioning => "PROVISIONING",
            HomeState::Idle => "IDLE",
            HomeState::Leased => "LEASED",
            HomeState::Active => "ACTIVE",
            HomeState::Frozen => "FROZEN",
            HomeState::Migrating => "MIGRATING",
            HomeState::Error => "ERROR",
            HomeState::Retired => "RETIRED",
        }
    }
}

impl std::fmt::Display for HomeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Home {
    pub home_id: HomeId,
    pub agent_id: AgentId,
    pub node_id: NodeId,
    pub state: HomeState,
    pub lease_expires_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub metadata: HashMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HomeTransition {
    pub home_id: HomeId,
    pub timestamp: i64,
    pub from_state: HomeState,
    pub to_state: HomeState,
    pub reason: String,
    pub triggered_by: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: i64,
    pub agent_id: Option<AgentId>,
    pub home_id: Option<HomeId>,
    pub action: String,
    pub level: AuditLevel,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: ChannelId,
    pub name: String,
    pub topic: Option<String>,
    pub created_by: String,
    pub members: Vec<String>,
    pub archived: bool,
}

impl Channel {
    pub fn add_member(&mut self, member: impl Into<String>) -> bool {
        let member = member.into();
        if self.members.iter().any(|m| m == &member) {
            return false;
        }
        self.members.push(member);
        true
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel_id: ChannelId,
    pub seq: u64,
    pub agent_id: String,
    pub content: String,
    pub timestamp: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bridge {
    pub bridge_id: BridgeId,
    pub channel_id: ChannelId,
    pub platform: String,
    pub external_channel_id: String,
    pub active: bool,
    pub webhook_url: Option<String>,
    pub account_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoopState {
    Awake,
    Sleep,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentLoopRecord {
    pub agent_id: AgentId,
    pub state: LoopState,
    pub last_tick_at: i64,
    pub awakened_at: i64,
    pub slept_at: Option<i64>,
    pub sleep_reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Assignment {
    pub agent_id: AgentId,
    pub node_id: NodeId,
    pub assigned_at: i64,
    pub portable_path: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationPhase {
    Requested,
    Authorized,
    Freezing,
    Frozen,
    Snapshotting,
    Transferring,
    Verifying,
    Rehydrating,
    Finalizing,
    Completed,
    Aborted,
    Failed,
}

impl MigrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationPhase::Requested => "REQUESTED",
            MigrationPhase::Authorized => "AUTHORIZED",
            MigrationPhase::Freezing => "FREEZING",
            MigrationPhase::Frozen => "FROZEN",
            MigrationPhase::Snapshotting => "SNAPSHOTTING",
            MigrationPhase::Transferring => "TRANSFERRING",
            MigrationPhase::Verifying => "VERIFYING",
            MigrationPhase::Rehydrating => "REHYDRATING",
            MigrationPhase::Finalizing => "FINALIZING",
            MigrationPhase::Completed => "COMPLETED",
            MigrationPhase::Aborted => "ABORTED",
            MigrationPhase::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationPhase::Completed | MigrationPhase::Aborted | MigrationPhase::Failed
        )
    }
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationEndpoint {
    pub node_id: NodeId,
    pub home_id: HomeId,
    pub endpoint: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationTicket {
    pub migration_id: MigrationId,
    pub agent_id: AgentId,
    pub source: MigrationEndpoint,
    pub target: MigrationEndpoint,
    pub phase: MigrationPhase,
    pub reason: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub error: Option<String>,
}
