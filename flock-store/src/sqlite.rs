//! SQLite-backed store family: the durable implementation (spec §4.1).
//!
//! One connection shared behind `Arc<Mutex<Connection>>`, blocking calls
//! wrapped in `tokio::task::block_in_place`, matching the pattern in the
//! teacher's `loom-workspace` store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flock_types::{
    AgentId, AuditLevel, BridgeId, ChannelId, FlockError, FlockResult, HomeId, MigrationId, NodeId,
};
use rusqlite::{params, Connection, OptionalExtension};

use crate::filters::{
    AssignmentFilter, AuditFilter, BridgeFilter, ChannelFilter, ChannelMessageFilter, HomeFilter,
    MigrationTicketFilter, TransitionFilter,
};
use crate::models::{
    AgentLoopRecord, Assignment, AuditEntry, Bridge, Channel, ChannelMessage, Home, HomeState,
    HomeTransition, LoopState, MigrationEndpoint, MigrationPhase, MigrationTicket,
};
use crate::traits::{
    AgentLoopStore, AgentLoopUpdate, AssignmentStore, AuditStore, BridgeStore, BridgeUpdate,
    ChannelMessageStore, ChannelStore, ChannelUpdate, HomeStore, HomeUpdate, MigrationTicketStore,
    MigrationTicketUpdate, Stores, TransitionStore,
};

fn storage_err<E: std::fmt::Display>(e: E) -> FlockError {
    FlockError::Storage(e.to_string())
}

fn parse_state(s: &str) -> FlockResult<HomeState> {
    Ok(match s {
        "UNASSIGNED" => HomeState::Unassigned,
        "PROVISIONING" => HomeState::Provisioning,
        "IDLE" => HomeState::Idle,
        "LEASED" => HomeState::Leased,
        "ACTIVE" => HomeState::Active,
        "FROZEN" => HomeState::Frozen,
        "MIGRATING" => HomeState::Migrating,
        "ERROR" => HomeState::Error,
        "RETIRED" => HomeState::Retired,
        other => return Err(FlockError::Internal(format!("unknown home state {other}"))),
    })
}

fn parse_phase(s: &str) -> FlockResult<MigrationPhase> {
    Ok(match s {
        "REQUESTED" => MigrationPhase::Requested,
        "AUTHORIZED" => MigrationPhase::Authorized,
        "FREEZING" => MigrationPhase::Freezing,
        "FROZEN" => MigrationPhase::Frozen,
        "SNAPSHOTTING" => MigrationPhase::Snapshotting,
        "TRANSFERRING" => MigrationPhase::Transferring,
        "VERIFYING" => MigrationPhase::Verifying,
        "REHYDRATING" => MigrationPhase::Rehydrating,
        "FINALIZING" => MigrationPhase::Finalizing,
        "COMPLETED" => MigrationPhase::Completed,
        "ABORTED" => MigrationPhase::Aborted,
        "FAILED" => MigrationPhase::Failed,
        other => return Err(FlockError::Internal(format!("unknown migration phase {other}"))),
    })
}

fn parse_loop_state(s: &str) -> FlockResult<LoopState> {
    Ok(match s {
        "AWAKE" => LoopState::Awake,
        "SLEEP" => LoopState::Sleep,
        other => return Err(FlockError::Internal(format!("unknown loop state {other}"))),
    })
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS homes (
    home_id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    node_id TEXT NOT NULL,
    state TEXT NOT NULL,
    lease_expires_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    metadata TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS home_transitions (
    home_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    from_state TEXT NOT NULL,
    to_state TEXT NOT NULL,
    reason TEXT NOT NULL,
    triggered_by TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_home_transitions_home_id ON home_transitions(home_id);
CREATE TABLE IF NOT EXISTS audit_entries (
    id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    agent_id TEXT,
    home_id TEXT,
    action TEXT NOT NULL,
    level TEXT NOT NULL,
    detail TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS channels (
    channel_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    topic TEXT,
    created_by TEXT NOT NULL,
    members TEXT NOT NULL,
    archived INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS channel_messages (
    channel_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    agent_id TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    PRIMARY KEY (channel_id, seq)
);
CREATE TABLE IF NOT EXISTS bridges (
    bridge_id TEXT PRIMARY KEY,
    channel_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    external_channel_id TEXT NOT NULL,
    active INTEGER NOT NULL,
    webhook_url TEXT,
    account_id TEXT
);
CREATE TABLE IF NOT EXISTS agent_loops (
    agent_id TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    last_tick_at INTEGER NOT NULL,
    awakened_at INTEGER NOT NULL,
    slept_at INTEGER,
    sleep_reason TEXT
);
CREATE TABLE IF NOT EXISTS assignments (
    agent_id TEXT PRIMARY KEY,
    node_id TEXT NOT NULL,
    assigned_at INTEGER NOT NULL,
    portable_path TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS migration_tickets (
    migration_id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    phase TEXT NOT NULL,
    reason TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    error TEXT
);
"#;

fn open(path: &Path) -> FlockResult<Connection> {
    let conn = Connection::open(path).map_err(storage_err)?;
    conn.execute_batch(SCHEMA).map_err(storage_err)?;
    Ok(conn)
}

macro_rules! blocking {
    ($db:expr, $body:expr) => {{
        let db = $db.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().unwrap();
            $body(&conn)
        })
    }};
}

pub struct SqliteHomeStore {
    db: Arc<Mutex<Connection>>,
}

#[async_trait]
impl HomeStore for SqliteHomeStore {
    async fn insert(&self, home: Home) -> FlockResult<()> {
        let metadata = serde_json::to_string(&home.metadata).map_err(storage_err)?;
        blocking!(self.db, |conn: &Connection| {
            conn.execute(
                "INSERT INTO homes (home_id, agent_id, node_id, state, lease_expires_at, created_at, updated_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    home.home_id.as_str(),
                    home.agent_id.as_str(),
                    home.node_id.as_str(),
                    home.state.as_str(),
                    home.lease_expires_at,
                    home.created_at,
                    home.updated_at,
                    metadata,
                ],
            )
            .map_err(|e| {
                if let rusqlite::Error::SqliteFailure(f, _) = &e {
                    if f.code == rusqlite::ErrorCode::ConstraintViolation {
                        return FlockError::AlreadyExists(home.home_id.as_str().to_string());
                    }
                }
                storage_err(e)
            })?;
            Ok(())
        })
    }

    async fn update(&self, home_id: &HomeId, update: HomeUpdate) -> FlockResult<Home> {
        let home_id = home_id.clone();
        blocking!(self.db, |conn: &Connection| {
            let mut home = row_to_home(conn, &home_id)?;
            if let Some(state) = update.state {
                home.state = state;
            }
            if let Some(lease) = update.lease_expires_at {
                home.lease_expires_at = lease;
            }
            if let Some(metadata) = update.metadata {
                home.metadata = metadata;
            }
            let metadata = serde_json::to_string(&home.metadata).map_err(storage_err)?;
            conn.execute(
                "UPDATE homes SET state = ?1, lease_expires_at = ?2, metadata = ?3 WHERE home_id = ?4",
                params![home.state.as_str(), home.lease_expires_at, metadata, home.home_id.as_str()],
            )
            .map_err(storage_err)?;
            Ok(home)
        })
    }

    async fn get(&self, home_id: &HomeId) -> FlockResult<Option<Home>> {
        let home_id = home_id.clone();
        blocking!(self.db, |conn: &Connection| {
            match row_to_home(conn, &home_id) {
                Ok(h) => Ok(Some(h)),
                Err(FlockError::HomeNotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    async fn list(&self, filter: HomeFilter) -> FlockResult<Vec<Home>> {
        blocking!(self.db, |conn: &Connection| {
            let mut stmt = conn
                .prepare("SELECT home_id FROM homes ORDER BY home_id ASC")
                .map_err(storage_err)?;
            let ids: Vec<String> = stmt
                .query_map([], |row| row.get(0))
                .map_err(storage_err)?
                .collect::<Result<_, _>>()
                .map_err(storage_err)?;
            let mut out = Vec::new();
            for id in ids {
                let home_id = HomeId::parse(id).map_err(storage_err)?;
                let home = row_to_home(conn, &home_id)?;
                if filter.agent_id.as_ref().map_or(false, |a| &home.agent_id != a) {
                    continue;
                }
                if filter.node_id.as_ref().map_or(false, |n| &home.node_id != n) {
                    continue;
                }
                if filter.state.map_or(false, |s| home.state != s) {
                    continue;
                }
                if filter.since.map_or(false, |s| home.updated_at < s) {
                    continue;
                }
                out.push(home);
            }
            if let Some(limit) = filter.limit {
                out.truncate(limit);
            }
            Ok(out)
        })
    }
}

fn row_to_home(conn: &Connection, home_id: &HomeId) -> FlockResult<Home> {
    conn.query_row(
        "SELECT agent_id, node_id, state, lease_expires_at, created_at, updated_at, metadata FROM homes WHERE home_id = ?1",
        params![home_id.as_str()],
        |row| {
            let agent_id: String = row.get(0)?;
            let node_id: String = row.get(1)?;
            let state: String = row.get(2)?;
            let lease_expires_at: Option<i64> = row.get(3)?;
            let created_at: i64 = row.get(4)?;
            let updated_at: i64 = row.get(5)?;
            let metadata: String = row.get(6)?;
            Ok((agent_id, node_id, state, lease_expires_at, created_at, updated_at, metadata))
        },
    )
    .optional()
    .map_err(storage_err)?
    .ok_or_else(|| FlockError::HomeNotFound(home_id.as_str().to_string()))
    .and_then(|(agent_id, node_id, state, lease_expires_at, created_at, updated_at, metadata)| {
        Ok(Home {
            home_id: home_id.clone(),
            agent_id: AgentId::new(agent_id).map_err(storage_err)?,
            node_id: NodeId::new(node_id).map_err(storage_err)?,
            state: parse_state(&state)?,
            lease_expires_at,
            created_at,
            updated_at,
            metadata: serde_json::from_str(&metadata).map_err(storage_err)?,
        })
    })
}

pub struct SqliteTransitionStore {
    db: Arc<Mutex<Connection>>,
}

#[async_trait]
impl TransitionStore for SqliteTransitionStore {
    async fn insert(&self, transition: HomeTransition) -> FlockResult<()> {
        blocking!(self.db, |conn: &Connection| {
            conn.execute(
                "INSERT INTO home_transitions (home_id, timestamp, from_state, to_state, reason, triggered_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    transition.home_id.as_str(),
                    transition.timestamp,
                    transition.from_state.as_str(),
                    transition.to_state.as_str(),
                    transition.reason,
                    transition.triggered_by,
                ],
            )
            .map_err(storage_err)?;
            Ok(())
        })
    }

    async fn list(&self, filter: TransitionFilter) -> FlockResult<Vec<HomeTransition>> {
        blocking!(self.db, |conn: &Connection| {
            let mut stmt = conn
                .prepare(
                    "SELECT home_id, timestamp, from_state, to_state, reason, triggered_by
                     FROM home_transitions ORDER BY timestamp ASC",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], |row| {
                    let home_id: String = row.get(0)?;
                    let timestamp: i64 = row.get(1)?;
                    let from_state: String = row.get(2)?;
                    let to_state: String = row.get(3)?;
                    let reason: String = row.get(4)?;
                    let triggered_by: String = row.get(5)?;
                    Ok((home_id, timestamp, from_state, to_state, reason, triggered_by))
                })
                .map_err(storage_err)?;
            let mut out = Vec::new();
            for row in rows {
                let (home_id, timestamp, from_state, to_state, reason, triggered_by) =
                    row.map_err(storage_err)?;
                if filter
                    .home_id
                    .as_ref()
                    .map_or(false, |h| h.as_str() != home_id)
                {
                    continue;
                }
                if filter.since.map_or(false, |s| timestamp < s) {
                    continue;
                }
                out.push(HomeTransition {
                    home_id: HomeId::parse(home_id).map_err(storage_err)?,
                    timestamp,
                    from_state: parse_state(&from_state)?,
                    to_state: parse_state(&to_state)?,
                    reason,
                    triggered_by,
                });
            }
            if let Some(limit) = filter.limit {
                out.truncate(limit);
            }
            Ok(out)
        })
    }
}

pub struct SqliteAuditStore {
    db: Arc<Mutex<Connection>>,
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn insert(&self, entry: AuditEntry) -> FlockResult<()> {
        blocking!(self.db, |conn: &Connection| {
            conn.execute(
                "INSERT INTO audit_entries (id, timestamp, agent_id, home_id, action, level, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.id,
                    entry.timestamp,
                    entry.agent_id.as_ref().map(|a| a.as_str()),
                    entry.home_id.as_ref().map(|h| h.as_str()),
                    entry.action,
                    entry.level.as_str(),
                    entry.detail,
                ],
            )
            .map_err(|e| {
                if let rusqlite::Error::SqliteFailure(f, _) = &e {
                    if f.code == rusqlite::ErrorCode::ConstraintViolation {
                        return FlockError::Duplicate(entry.id.clone());
                    }
                }
                storage_err(e)
            })?;
            Ok(())
        })
    }

    async fn list(&self, filter: AuditFilter) -> FlockResult<Vec<AuditEntry>> {
        blocking!(self.db, |conn: &Connection| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, timestamp, agent_id, home_id, action, level, detail
                     FROM audit_entries ORDER BY timestamp ASC",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], |row| {
                    let id: String = row.get(0)?;
                    let timestamp: i64 = row.get(1)?;
                    let agent_id: Option<String> = row.get(2)?;
                    let home_id: Option<String> = row.get(3)?;
                    let action: String = row.get(4)?;
                    let level: String = row.get(5)?;
                    let detail: String = row.get(6)?;
                    Ok((id, timestamp, agent_id, home_id, action, level, detail))
                })
                .map_err(storage_err)?;
            let mut out = Vec::new();
            for row in rows {
                let (id, timestamp, agent_id, home_id, action, level, detail) =
                    row.map_err(storage_err)?;
                let agent_id = agent_id.map(AgentId::new).transpose().map_err(storage_err)?;
                let home_id = home_id.map(HomeId::parse).transpose().map_err(storage_err)?;
                if filter.agent_id.as_ref().map_or(false, |a| Some(a) != agent_id.as_ref()) {
                    continue;
                }
                if filter.home_id.as_ref().map_or(false, |h| Some(h) != home_id.as_ref()) {
                    continue;
                }
                if filter.since.map_or(false, |s| timestamp < s) {
                    continue;
                }
                let level = match level.as_str() {
                    "GREEN" => AuditLevel::Green,
                    "YELLOW" => AuditLevel::Yellow,
                    "RED" => AuditLevel::Red,
                    other => return Err(FlockError::Internal(format!("unknown audit level {other}"))),
                };
                out.push(AuditEntry {
                    id,
                    timestamp,
                    agent_id,
                    home_id,
                    action,
                    level,
                    detail,
                });
            }
            if let Some(limit) = filter.limit {
                out.truncate(limit);
            }
            Ok(out)
        })
    }
}

pub struct SqliteChannelStore {
    db: Arc<Mutex<Connection>>,
}

#[async_trait]
impl ChannelStore for SqliteChannelStore {
    async fn insert(&self, channel: Channel) -> FlockResult<()> {
        let members = serde_json::to_string(&channel.members).map_err(storage_err)?;
        blocking!(self.db, |conn: &Connection| {
            conn.execute(
                "INSERT INTO channels (channel_id, name, topic, created_by, members, archived)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    channel.channel_id.as_str(),
                    channel.name,
                    channel.topic,
                    channel.created_by,
                    members,
                    channel.archived as i64,
                ],
            )
            .map_err(|e| {
                if let rusqlite::Error::SqliteFailure(f, _) = &e {
                    if f.code == rusqlite::ErrorCode::ConstraintViolation {
                        return FlockError::AlreadyExists(channel.channel_id.as_str().to_string());
                    }
                }
                storage_err(e)
            })?;
            Ok(())
        })
    }

    async fn update(&self, channel_id: &ChannelId, update: ChannelUpdate) -> FlockResult<Channel> {
        let channel_id = channel_id.clone();
        blocking!(self.db, |conn: &Connection| {
            let mut channel = row_to_channel(conn, &channel_id)?;
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
            let members = serde_json::to_string(&channel.members).map_err(storage_err)?;
            conn.execute(
                "UPDATE channels SET topic = ?1, members = ?2, archived = ?3 WHERE channel_id = ?4",
                params![channel.topic, members, channel.archived as i64, channel.channel_id.as_str()],
            )
            .map_err(storage_err)?;
            Ok(channel)
        })
    }

    async fn get(&self, channel_id: &ChannelId) -> FlockResult<Option<Channel>> {
        let channel_id = channel_id.clone();
        blocking!(self.db, |conn: &Connection| {
            match row_to_channel(conn, &channel_id) {
                Ok(c) => Ok(Some(c)),
                Err(FlockError::ChannelNotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    async fn list(&self, filter: ChannelFilter) -> FlockResult<Vec<Channel>> {
        blocking!(self.db, |conn: &Connection| {
            let mut stmt = conn
                .prepare("SELECT channel_id FROM channels ORDER BY channel_id ASC")
                .map_err(storage_err)?;
            let ids: Vec<String> = stmt
                .query_map([], |row| row.get(0))
                .map_err(storage_err)?
                .collect::<Result<_, _>>()
                .map_err(storage_err)?;
            let mut out = Vec::new();
            for id in ids {
                let cid = ChannelId::new(id).map_err(storage_err)?;
                let channel = row_to_channel(conn, &cid)?;
                if filter.archived.map_or(false, |a| channel.archived != a) {
                    continue;
                }
                if filter
                    .member
                    .as_ref()
                    .map_or(false, |m| !channel.members.iter().any(|x| x == m))
                {
                    continue;
                }
                out.push(channel);
            }
            if let Some(limit) = filter.limit {
                out.truncate(limit);
            }
            Ok(out)
        })
    }
}

fn row_to_channel(conn: &Connection, channel_id: &ChannelId) -> FlockResult<Channel> {
    conn.query_row(
        "SELECT name, topic, created_by, members, archived FROM channels WHERE channel_id = ?1",
        params![channel_id.as_str()],
        |row| {
            let name: String = row.get(0)?;
            let topic: Option<String> = row.get(1)?;
            let created_by: String = row.get(2)?;
            let members: String = row.get(3)?;
            let archived: i64 = row.get(4)?;
            Ok((name, topic, created_by, members, archived))
        },
    )
    .optional()
    .map_err(storage_err)?
    .ok_or_else(|| FlockError::ChannelNotFound(channel_id.as_str().to_string()))
    .and_then(|(name, topic, created_by, members, archived)| {
        Ok(Channel {
            channel_id: channel_id.clone(),
            name,
            topic,
            created_by,
            members: serde_json::from_str(&members).map_err(storage_err)?,
            archived: archived != 0,
        })
    })
}

pub struct SqliteChannelMessageStore {
    db: Arc<Mutex<Connection>>,
}

#[async_trait]
impl ChannelMessageStore for SqliteChannelMessageStore {
    async fn append(
        &self,
        channel_id: &ChannelId,
        agent_id: &str,
        content: &str,
        timestamp: i64,
    ) -> FlockResult<ChannelMessage> {
        let channel_id = channel_id.clone();
        let agent_id = agent_id.to_string();
        let content = content.to_string();
        blocking!(self.db, |conn: &Connection| {
            let tx = conn.unchecked_transaction().map_err(storage_err)?;
            let next_seq: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(seq), 0) + 1 FROM channel_messages WHERE channel_id = ?1",
                    params![channel_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(storage_err)?;
            tx.execute(
                "INSERT INTO channel_messages (channel_id, seq, agent_id, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![channel_id.as_str(), next_seq, agent_id, content, timestamp],
            )
            .map_err(storage_err)?;
            tx.commit().map_err(storage_err)?;
            Ok(ChannelMessage {
                channel_id,
                seq: next_seq as u64,
                agent_id,
                content,
                timestamp,
            })
        })
    }

    async fn list(&self, filter: ChannelMessageFilter) -> FlockResult<Vec<ChannelMessage>> {
        blocking!(self.db, |conn: &Connection| {
            let (sql, channel_id_str) = match &filter.channel_id {
                Some(cid) => (
                    "SELECT channel_id, seq, agent_id, content, timestamp FROM channel_messages
                     WHERE channel_id = ?1 ORDER BY seq ASC",
                    Some(cid.as_str().to_string()),
                ),
                None => (
                    "SELECT channel_id, seq, agent_id, content, timestamp FROM channel_messages
                     ORDER BY channel_id ASC, seq ASC",
                    None,
                ),
            };
            let mut stmt = conn.prepare(sql).map_err(storage_err)?;
            let map_row = |row: &rusqlite::Row| -> rusqlite::Result<(String, i64, String, String, i64)> {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            };
            let rows: Vec<_> = if let Some(cid) = &channel_id_str {
                stmt.query_map(params![cid], map_row)
                    .map_err(storage_err)?
                    .collect::<Result<_, _>>()
                    .map_err(storage_err)?
            } else {
                stmt.query_map([], map_row)
                    .map_err(storage_err)?
                    .collect::<Result<_, _>>()
                    .map_err(storage_err)?
            };
            let mut out = Vec::new();
            for (channel_id, seq, agent_id, content, timestamp) in rows {
                if filter.since_seq.map_or(false, |s| (seq as u64) < s) {
                    continue;
                }
                out.push(ChannelMessage {
                    channel_id: ChannelId::new(channel_id).map_err(storage_err)?,
                    seq: seq as u64,
                    agent_id,
                    content,
                    timestamp,
                });
            }
            if let Some(limit) = filter.limit {
                out.truncate(limit);
            }
            Ok(out)
        })
    }
}

pub struct SqliteBridgeStore {
    db: Arc<Mutex<Connection>>,
}

#[async_trait]
impl BridgeStore for SqliteBridgeStore {
    async fn insert(&self, bridge: Bridge) -> FlockResult<()> {
        blocking!(self.db, |conn: &Connection| {
            if bridge.active {
                let collision: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM bridges WHERE active = 1 AND platform = ?1 AND external_channel_id = ?2",
                        params![bridge.platform, bridge.external_channel_id],
                        |row| row.get(0),
                    )
                    .map_err(storage_err)?;
                if collision > 0 {
                    return Err(FlockError::AlreadyExists(format!(
                        "active bridge for {}/{}",
                        bridge.platform, bridge.external_channel_id
                    )));
                }
            }
            conn.execute(
                "INSERT INTO bridges (bridge_id, channel_id, platform, external_channel_id, active, webhook_url, account_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bridge.bridge_id.as_str(),
                    bridge.channel_id.as_str(),
                    bridge.platform,
                    bridge.external_channel_id,
                    bridge.active as i64,
                    bridge.webhook_url,
                    bridge.account_id,
                ],
            )
            .map_err(storage_err)?;
            Ok(())
        })
    }

    async fn update(&self, bridge_id: &BridgeId, update: BridgeUpdate) -> FlockResult<Bridge> {
        let bridge_id = bridge_id.clone();
        blocking!(self.db, |conn: &Connection| {
            let mut bridge = row_to_bridge(conn, &bridge_id)?;
            if let Some(active) = update.active {
                bridge.active = active;
            }
            conn.execute(
                "UPDATE bridges SET active = ?1 WHERE bridge_id = ?2",
                params![bridge.active as i64, bridge.bridge_id.as_str()],
            )
            .map_err(storage_err)?;
            Ok(bridge)
        })
    }

    async fn get(&self, bridge_id: &BridgeId) -> FlockResult<Option<Bridge>> {
        let bridge_id = bridge_id.clone();
        blocking!(self.db, |conn: &Connection| {
            match row_to_bridge(conn, &bridge_id) {
                Ok(b) => Ok(Some(b)),
                Err(FlockError::ChannelNotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    async fn list(&self, filter: BridgeFilter) -> FlockResult<Vec<Bridge>> {
        blocking!(self.db, |conn: &Connection| {
            let mut stmt = conn
                .prepare("SELECT bridge_id FROM bridges ORDER BY bridge_id ASC")
                .map_err(storage_err)?;
            let ids: Vec<String> = stmt
                .query_map([], |row| row.get(0))
                .map_err(storage_err)?
                .collect::<Result<_, _>>()
                .map_err(storage_err)?;
            let mut out = Vec::new();
            for id in ids {
                let bid = BridgeId::new(id).map_err(storage_err)?;
                let bridge = row_to_bridge(conn, &bid)?;
                if filter.channel_id.as_ref().map_or(false, |c| &bridge.channel_id != c) {
                    continue;
                }
                if filter.platform.as_ref().map_or(false, |p| &bridge.platform != p) {
                    continue;
                }
                if filter
                    .external_channel_id
                    .as_ref()
                    .map_or(false, |e| &bridge.external_channel_id != e)
                {
                    continue;
                }
                if filter.active.map_or(false, |a| bridge.active != a) {
                    continue;
                }
                out.push(bridge);
            }
            if let Some(limit) = filter.limit {
                out.truncate(limit);
            }
            Ok(out)
        })
    }
}

fn row_to_bridge(conn: &Connection, bridge_id: &BridgeId) -> FlockResult<Bridge> {
    conn.query_row(
        "SELECT channel_id, platform, external_channel_id, active, webhook_url, account_id
         FROM bridges WHERE bridge_id = ?1",
        params![bridge_id.as_str()],
        |row| {
            let channel_id: String = row.get(0)?;
            let platform: String = row.get(1)?;
            let external_channel_id: String = row.get(2)?;
            let active: i64 = row.get(3)?;
            let webhook_url: Option<String> = row.get(4)?;
            let account_id: Option<String> = row.get(5)?;
            Ok((channel_id, platform, external_channel_id, active, webhook_url, account_id))
        },
    )
    .optional()
    .map_err(storage_err)?
    .ok_or_else(|| FlockError::ChannelNotFound(bridge_id.as_str().to_string()))
    .and_then(|(channel_id, platform, external_channel_id, active, webhook_url, account_id)| {
        Ok(Bridge {
            bridge_id: bridge_id.clone(),
            channel_id: ChannelId::new(channel_id).map_err(storage_err)?,
            platform,
            external_channel_id,
            active: active != 0,
            webhook_url,
            account_id,
        })
    })
}

pub struct SqliteAgentLoopStore {
    db: Arc<Mutex<Connection>>,
}

#[async_trait]
impl AgentLoopStore for SqliteAgentLoopStore {
    async fn init(&self, agent_id: &AgentId, now: i64) -> FlockResult<AgentLoopRecord> {
        let agent_id = agent_id.clone();
        blocking!(self.db, |conn: &Connection| {
            if let Some(existing) = row_to_agent_loop(conn, &agent_id).ok() {
                return Ok(existing);
            }
            conn.execute(
                "INSERT INTO agent_loops (agent_id, state, last_tick_at, awakened_at, slept_at, sleep_reason)
                 VALUES (?1, 'SLEEP', ?2, ?2, ?2, 'initialized')",
                params![agent_id.as_str(), now],
            )
            .map_err(storage_err)?;
            row_to_agent_loop(conn, &agent_id)
        })
    }

    async fn update(
        &self,
        agent_id: &AgentId,
        update: AgentLoopUpdate,
    ) -> FlockResult<AgentLoopRecord> {
        let agent_id = agent_id.clone();
        blocking!(self.db, |conn: &Connection| {
            let mut record = row_to_agent_loop(conn, &agent_id)?;
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
            let state_str = match record.state {
                LoopState::Awake => "AWAKE",
                LoopState::Sleep => "SLEEP",
            };
            conn.execute(
                "UPDATE agent_loops SET state = ?1, last_tick_at = ?2, awakened_at = ?3, slept_at = ?4, sleep_reason = ?5
                 WHERE agent_id = ?6",
                params![
                    state_str,
                    record.last_tick_at,
                    record.awakened_at,
                    record.slept_at,
                    record.sleep_reason,
                    record.agent_id.as_str(),
                ],
            )
            .map_err(storage_err)?;
            Ok(record)
        })
    }

    async fn get(&self, agent_id: &AgentId) -> FlockResult<Option<AgentLoopRecord>> {
        let agent_id = agent_id.clone();
        blocking!(self.db, |conn: &Connection| {
            match row_to_agent_loop(conn, &agent_id) {
                Ok(r) => Ok(Some(r)),
                Err(FlockError::AgentNotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    async fn list_awake(&self) -> FlockResult<Vec<AgentLoopRecord>> {
        blocking!(self.db, |conn: &Connection| {
            let mut stmt = conn
                .prepare("SELECT agent_id FROM agent_loops WHERE state = 'AWAKE' ORDER BY agent_id ASC")
                .map_err(storage_err)?;
            let ids: Vec<String> = stmt
                .query_map([], |row| row.get(0))
                .map_err(storage_err)?
                .collect::<Result<_, _>>()
                .map_err(storage_err)?;
            let mut out = Vec::new();
            for id in ids {
                let aid = AgentId::new(id).map_err(storage_err)?;
                out.push(row_to_agent_loop(conn, &aid)?);
            }
            Ok(out)
        })
    }
}

fn row_to_agent_loop(conn: &Connection, agent_id: &AgentId) -> FlockResult<AgentLoopRecord> {
    conn.query_row(
        "SELECT state, last_tick_at, awakened_at, slept_at, sleep_reason FROM agent_loops WHERE agent_id = ?1",
        params![agent_id.as_str()],
        |row| {
            let state: String = row.get(0)?;
            let last_tick_at: i64 = row.get(1)?;
            let awakened_at: i64 = row.get(2)?;
            let slept_at: Option<i64> = row.get(3)?;
            let sleep_reason: Option<String> = row.get(4)?;
            Ok((state, last_tick_at, awakened_at, slept_at, sleep_reason))
        },
    )
    .optional()
    .map_err(storage_err)?
    .ok_or_else(|| FlockError::AgentNotFound(agent_id.as_str().to_string()))
    .and_then(|(state, last_tick_at, awakened_at, slept_at, sleep_reason)| {
        Ok(AgentLoopRecord {
            agent_id: agent_id.clone(),
            state: parse_loop_state(&state)?,
            last_tick_at,
            awakened_at,
            slept_at,
            sleep_reason,
        })
    })
}

pub struct SqliteAssignmentStore {
    db: Arc<Mutex<Connection>>,
}

#[async_trait]
impl AssignmentStore for SqliteAssignmentStore {
    async fn upsert(&self, assignment: Assignment) -> FlockResult<()> {
        blocking!(self.db, |conn: &Connection| {
            conn.execute(
                "INSERT INTO assignments (agent_id, node_id, assigned_at, portable_path)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(agent_id) DO UPDATE SET node_id = excluded.node_id,
                    assigned_at = excluded.assigned_at, portable_path = excluded.portable_path",
                params![
                    assignment.agent_id.as_str(),
                    assignment.node_id.as_str(),
                    assignment.assigned_at,
                    assignment.portable_path,
                ],
            )
            .map_err(storage_err)?;
            Ok(())
        })
    }

    async fn get(&self, agent_id: &AgentId) -> FlockResult<Option<Assignment>> {
        let agent_id = agent_id.clone();
        blocking!(self.db, |conn: &Connection| {
            conn.query_row(
                "SELECT node_id, assigned_at, portable_path FROM assignments WHERE agent_id = ?1",
                params![agent_id.as_str()],
                |row| {
                    let node_id: String = row.get(0)?;
                    let assigned_at: i64 = row.get(1)?;
                    let portable_path: String = row.get(2)?;
                    Ok((node_id, assigned_at, portable_path))
                },
            )
            .optional()
            .map_err(storage_err)?
            .map(|(node_id, assigned_at, portable_path)| {
                Ok(Assignment {
                    agent_id: agent_id.clone(),
                    node_id: NodeId::new(node_id).map_err(storage_err)?,
                    assigned_at,
                    portable_path,
                })
            })
            .transpose()
        })
    }

    async fn list(&self, filter: AssignmentFilter) -> FlockResult<Vec<Assignment>> {
        blocking!(self.db, |conn: &Connection| {
            let mut stmt = conn
                .prepare("SELECT agent_id, node_id, assigned_at, portable_path FROM assignments ORDER BY agent_id ASC")
                .map_err(storage_err)?;
            let rows = stmt
                .query_map([], |row| {
                    let agent_id: String = row.get(0)?;
                    let node_id: String = row.get(1)?;
                    let assigned_at: i64 = row.get(2)?;
                    let portable_path: String = row.get(3)?;
                    Ok((agent_id, node_id, assigned_at, portable_path))
                })
                .map_err(storage_err)?;
            let mut out = Vec::new();
            for row in rows {
                let (agent_id, node_id, assigned_at, portable_path) = row.map_err(storage_err)?;
                let node_id = NodeId::new(node_id).map_err(storage_err)?;
                if filter.node_id.as_ref().map_or(false, |n| n != &node_id) {
                    continue;
                }
                out.push(Assignment {
                    agent_id: AgentId::new(agent_id).map_err(storage_err)?,
                    node_id,
                    assigned_at,
                    portable_path,
                });
            }
            if let Some(limit) = filter.limit {
                out.truncate(limit);
            }
            Ok(out)
        })
    }
}

pub struct SqliteMigrationTicketStore {
    db: Arc<Mutex<Connection>>,
}

#[async_trait]
impl MigrationTicketStore for SqliteMigrationTicketStore {
    async fn insert(&self, ticket: MigrationTicket) -> FlockResult<()> {
        let source = serde_json::to_string(&ticket.source).map_err(storage_err)?;
        let target = serde_json::to_string(&ticket.target).map_err(storage_err)?;
        blocking!(self.db, |conn: &Connection| {
            conn.execute(
                "INSERT INTO migration_tickets (migration_id, agent_id, source, target, phase, reason, created_at, updated_at, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    ticket.migration_id.as_str(),
                    ticket.agent_id.as_str(),
                    source,
                    target,
                    ticket.phase.as_str(),
                    ticket.reason,
                    ticket.created_at,
                    ticket.updated_at,
                    ticket.error,
                ],
            )
            .map_err(|e| {
                if let rusqlite::Error::SqliteFailure(f, _) = &e {
                    if f.code == rusqlite::ErrorCode::ConstraintViolation {
                        return FlockError::AlreadyExists(ticket.migration_id.as_str().to_string());
                    }
                }
                storage_err(e)
            })?;
            Ok(())
        })
    }

    async fn update(
        &self,
        migration_id: &MigrationId,
        update: MigrationTicketUpdate,
    ) -> FlockResult<MigrationTicket> {
        let migration_id = migration_id.clone();
        blocking!(self.db, |conn: &Connection| {
            let mut ticket = row_to_ticket(conn, &migration_id)?;
            if let Some(phase) = update.phase {
                ticket.phase = phase;
            }
            if let Some(error) = update.error {
                ticket.error = error;
            }
            conn.execute(
                "UPDATE migration_tickets SET phase = ?1, error = ?2, updated_at = ?3 WHERE migration_id = ?4",
                params![ticket.phase.as_str(), ticket.error, ticket.updated_at, ticket.migration_id.as_str()],
            )
            .map_err(storage_err)?;
            Ok(ticket)
        })
    }

    async fn get(&self, migration_id: &MigrationId) -> FlockResult<Option<MigrationTicket>> {
        let migration_id = migration_id.clone();
        blocking!(self.db, |conn: &Connection| {
            match row_to_ticket(conn, &migration_id) {
                Ok(t) => Ok(Some(t)),
                Err(FlockError::TicketNotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    async fn list(&self, filter: MigrationTicketFilter) -> FlockResult<Vec<MigrationTicket>> {
        blocking!(self.db, |conn: &Connection| {
            let mut stmt = conn
                .prepare("SELECT migration_id FROM migration_tickets ORDER BY created_at ASC")
                .map_err(storage_err)?;
            let ids: Vec<String> = stmt
                .query_map([], |row| row.get(0))
                .map_err(storage_err)?
                .collect::<Result<_, _>>()
                .map_err(storage_err)?;
            let mut out = Vec::new();
            for id in ids {
                let mid = MigrationId::new(id).map_err(storage_err)?;
                let ticket = row_to_ticket(conn, &mid)?;
                if filter.agent_id.as_ref().map_or(false, |a| &ticket.agent_id != a) {
                    continue;
                }
                if filter.phase.map_or(false, |p| ticket.phase != p) {
                    continue;
                }
                if filter.since.map_or(false, |s| ticket.updated_at < s) {
                    continue;
                }
                out.push(ticket);
            }
            if let Some(limit) = filter.limit {
                out.truncate(limit);
            }
            Ok(out)
        })
    }
}

fn row_to_ticket(conn: &Connection, migration_id: &MigrationId) -> FlockResult<MigrationTicket> {
    conn.query_row(
        "SELECT agent_id, source, target, phase, reason, created_at, updated_at, error
         FROM migration_tickets WHERE migration_id = ?1",
        params![migration_id.as_str()],
        |row| {
            let agent_id: String = row.get(0)?;
            let source: String = row.get(1)?;
            let target: String = row.get(2)?;
            let phase: String = row.get(3)?;
            let reason: String = row.get(4)?;
            let created_at: i64 = row.get(5)?;
            let updated_at: i64 = row.get(6)?;
            let error: Option<String> = row.get(7)?;
            Ok((agent_id, source, target, phase, reason, created_at, updated_at, error))
        },
    )
    .optional()
    .map_err(storage_err)?
    .ok_or_else(|| FlockError::TicketNotFound(migration_id.as_str().to_string()))
    .and_then(|(agent_id, source, target, phase, reason, created_at, updated_at, error)| {
        let source: MigrationEndpoint = serde_json::from_str(&source).map_err(storage_err)?;
        let target: MigrationEndpoint = serde_json::from_str(&target).map_err(storage_err)?;
        Ok(MigrationTicket {
            migration_id: migration_id.clone(),
            agent_id: AgentId::new(agent_id).map_err(storage_err)?,
            source,
            target,
            phase: parse_phase(&phase)?,
            reason,
            created_at,
            updated_at,
            error,
        })
    })
}

/// SQLite-backed bundle implementing `Stores`. One file, one connection,
/// shared across every sub-store.
pub struct SqliteStores {
    homes: SqliteHomeStore,
    transitions: SqliteTransitionStore,
    audit: SqliteAuditStore,
    channels: SqliteChannelStore,
    channel_messages: SqliteChannelMessageStore,
    bridges: SqliteBridgeStore,
    agent_loops: SqliteAgentLoopStore,
    assignments: SqliteAssignmentStore,
    migration_tickets: SqliteMigrationTicketStore,
}

impl SqliteStores {
    /// Opens or creates the database and runs `migrate()` (schema init).
    pub fn new(path: impl AsRef<Path>) -> FlockResult<Self> {
        let conn = open(path.as_ref())?;
        let db = Arc::new(Mutex::new(conn));
        Ok(Self {
            homes: SqliteHomeStore { db: db.clone() },
            transitions: SqliteTransitionStore { db: db.clone() },
            audit: SqliteAuditStore { db: db.clone() },
            channels: SqliteChannelStore { db: db.clone() },
            channel_messages: SqliteChannelMessageStore { db: db.clone() },
            bridges: SqliteBridgeStore { db: db.clone() },
            agent_loops: SqliteAgentLoopStore { db: db.clone() },
            assignments: SqliteAssignmentStore { db: db.clone() },
            migration_tickets: SqliteMigrationTicketStore { db },
        })
    }

    /// Re-runs schema init; a no-op on an already-migrated database.
    pub fn migrate(&self) -> FlockResult<()> {
        self.homes.db.lock().unwrap().execute_batch(SCHEMA).map_err(storage_err)
    }

    /// Releases the connection. After this, the `Stores` bundle must not be
    /// used again.
    pub fn close(self) {
        drop(self);
    }
}

impl Stores for SqliteStores {
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
