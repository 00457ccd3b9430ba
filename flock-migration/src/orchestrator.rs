//! Migration orchestrator (spec §4.6): a thin driver over `advance_phase`,
//! the snapshot builder, and `MigrationTransport`, with rollback on any
//! error while the ticket is non-terminal.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use flock_home::HomeService;
use flock_store::{
    Assignment, HomeState, MigrationEndpoint, MigrationPhase, MigrationTicket, MigrationTicketFilter,
    MigrationTicketUpdate, Stores,
};
use flock_types::{AgentId, Clock, FlockError, FlockResult, Logger, MigrationId};

use crate::phases::{check_transition, MAX_PORTABLE_SIZE_BYTES};
use crate::snapshot::build_archive;
use crate::transport::MigrationTransport;

pub struct MigrationService {
    stores: Arc<dyn Stores>,
    homes: Arc<HomeService>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    transport: Arc<dyn MigrationTransport>,
    max_portable_size_bytes: u64,
}

impl MigrationService {
    pub fn new(
        stores: Arc<dyn Stores>,
        homes: Arc<HomeService>,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
        transport: Arc<dyn MigrationTransport>,
    ) -> Self {
        Self {
            stores,
            homes,
            clock,
            logger,
            transport,
            max_portable_size_bytes: MAX_PORTABLE_SIZE_BYTES,
        }
    }

    pub fn with_max_portable_size(mut self, max_portable_size_bytes: u64) -> Self {
        self.max_portable_size_bytes = max_portable_size_bytes;
        self
    }

    pub async fn get(&self, migration_id: &MigrationId) -> FlockResult<MigrationTicket> {
        self.stores
            .migration_tickets()
            .get(migration_id)
            .await?
            .ok_or_else(|| FlockError::TicketNotFound(migration_id.as_str().to_string()))
    }

    pub async fn initiate(
        &self,
        agent_id: &AgentId,
        source: MigrationEndpoint,
        target: MigrationEndpoint,
        reason: &str,
    ) -> FlockResult<MigrationTicket> {
        let now = self.clock.now_ms();
        let migration_id = MigrationId::new(format!(
            "{}-to-{}-{}",
            agent_id.as_str(),
            target.node_id.as_str(),
            now
        ))?;
        let ticket = MigrationTicket {
            migration_id,
            agent_id: agent_id.clone(),
            source,
            target,
            phase: MigrationPhase::Requested,
            reason: reason.to_string(),
            created_at: now,
            updated_at: now,
            error: None,
        };
        self.stores.migration_tickets().insert(ticket.clone()).await?;
        Ok(ticket)
    }

    /// Moves `migration_id` along the forward DAG only; rejects any
    /// transition absent from the table with `ErrInvalidPhase`.
    pub async fn advance_phase(
        &self,
        migration_id: &MigrationId,
        to: MigrationPhase,
    ) -> FlockResult<MigrationTicket> {
        let current = self.get(migration_id).await?;
        check_transition(migration_id.as_str(), current.phase, to)?;
        self.stores
            .migration_tickets()
            .update(
                migration_id,
                MigrationTicketUpdate {
                    phase: Some(to),
                    error: None,
                },
            )
            .await
    }

    /// Moves a non-terminal ticket to ABORTED or FAILED, bypassing the
    /// forward DAG (this is the rollback escape hatch spec §4.6 reserves
    /// for every non-terminal phase). A no-op if already terminal.
    pub async fn rollback(
        &self,
        migration_id: &MigrationId,
        reason: &str,
        failed: bool,
    ) -> FlockResult<MigrationTicket> {
        let current = self.get(migration_id).await?;
        if current.phase.is_terminal() {
            return Ok(current);
        }
        let to = if failed { MigrationPhase::Failed } else { MigrationPhase::Aborted };
        self.logger.warn(
            "flock_migration::orchestrator",
            &format!("rolling back {migration_id} from {} to {to}: {reason}", current.phase),
        );
        self.stores
            .migration_tickets()
            .update(
                migration_id,
                MigrationTicketUpdate {
                    phase: Some(to),
                    error: Some(Some(reason.to_string())),
                },
            )
            .await
    }

    /// Returns the caller's in-flight ticket for `agent_id`, if any (used by
    /// the frozen guard and by callers wanting to avoid double-initiating).
    pub async fn active_ticket_for(&self, agent_id: &AgentId) -> FlockResult<Option<MigrationTicket>> {
        let tickets = self
            .stores
            .migration_tickets()
            .list(MigrationTicketFilter {
                agent_id: Some(agent_id.clone()),
                ..Default::default()
            })
            .await?;
        Ok(tickets.into_iter().find(|t| !t.phase.is_terminal()))
    }

    /// Drives a migration end to end: initiate, notifyRequest, the ordered
    /// advance_phase sequence, snapshot, transferAndVerify, rehydrate,
    /// complete. Rolls back on any error while the ticket is non-terminal.
    pub async fn run(
        &self,
        agent_id: &AgentId,
        source: MigrationEndpoint,
        target: MigrationEndpoint,
        reason: &str,
        source_portable_path: &Path,
    ) -> FlockResult<MigrationTicket> {
        let ticket = self.initiate(agent_id, source.clone(), target.clone(), reason).await?;
        let migration_id = ticket.migration_id.clone();

        match self
            .drive(&migration_id, agent_id, &source, &target, reason, source_portable_path)
            .await
        {
            Ok(()) => self.get(&migration_id).await,
            Err(e) => {
                self.rollback(&migration_id, &e.to_string(), true).await?;
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        migration_id: &MigrationId,
        agent_id: &AgentId,
        source: &MigrationEndpoint,
        target: &MigrationEndpoint,
        reason: &str,
        source_portable_path: &Path,
    ) -> FlockResult<()> {
        let notify = self
            .transport
            .notify_request(flock_protocol::MigrationRequestParams {
                migration_id: migration_id.as_str().to_string(),
                agent_id: agent_id.as_str().to_string(),
                reason: reason.to_string(),
                source: flock_protocol::MigrationEndpointWire {
                    node_id: source.node_id.as_str().to_string(),
                    home_id: source.home_id.as_str().to_string(),
                    endpoint: source.endpoint.clone(),
                },
            })
            .await?;
        if !notify.accepted {
            return Err(FlockError::VerificationFailed(
                notify.reason.unwrap_or_else(|| "target declined migration request".to_string()),
            ));
        }
        self.advance_phase(migration_id, MigrationPhase::Authorized).await?;

        self.advance_phase(migration_id, MigrationPhase::Freezing).await?;
        self.homes
            .transition(&source.home_id, HomeState::Frozen, reason, "migration")
            .await?;
        self.advance_phase(migration_id, MigrationPhase::Frozen).await?;

        self.advance_phase(migration_id, MigrationPhase::Snapshotting).await?;
        let archive = build_archive(source_portable_path)?;
        if archive.size_bytes() > self.max_portable_size_bytes {
            return Err(FlockError::VerificationFailed(format!(
                "snapshot is {} bytes, exceeds the {} byte limit",
                archive.size_bytes(),
                self.max_portable_size_bytes
            )));
        }

        self.advance_phase(migration_id, MigrationPhase::Transferring).await?;
        let verify = self
            .transport
            .transfer_and_verify(flock_protocol::TransferAndVerifyParams {
                migration_id: migration_id.as_str().to_string(),
                agent_id: agent_id.as_str().to_string(),
                archive: flock_protocol::ArchivePayload {
                    archive_base64: base64::engine::general_purpose::STANDARD.encode(&archive.bytes),
                    digest_hex: archive.digest_hex.clone(),
                    size_bytes: archive.size_bytes(),
                },
            })
            .await?;

        self.advance_phase(migration_id, MigrationPhase::Verifying).await?;
        if !verify.verified {
            return Err(FlockError::VerificationFailed(
                verify.reason.unwrap_or_else(|| "target rejected archive".to_string()),
            ));
        }

        self.advance_phase(migration_id, MigrationPhase::Rehydrating).await?;
        let rehydrate = self
            .transport
            .rehydrate(flock_protocol::RehydrateParams {
                migration_id: migration_id.as_str().to_string(),
                agent_id: agent_id.as_str().to_string(),
                target_home_id: target.home_id.as_str().to_string(),
            })
            .await?;
        for warning in &rehydrate.warnings {
            self.logger.warn(
                "flock_migration::orchestrator",
                &format!("rehydrate warning for {migration_id}: {warning}"),
            );
        }

        self.advance_phase(migration_id, MigrationPhase::Finalizing).await?;
        self.homes
            .transition(&source.home_id, HomeState::Retired, "migrated away", "migration")
            .await?;
        // §3 Assignment invariant: portablePath carries over across
        // reassignment unless the caller explicitly overrides it. There is
        // no override path yet, so the existing assignment (if any) always
        // wins; only a first-ever assignment falls back to the target home.
        let portable_path = self
            .stores
            .assignments()
            .get(agent_id)
            .await?
            .map(|a| a.portable_path)
            .unwrap_or_else(|| target.home_id.as_str().to_string());
        self.stores
            .assignments()
            .upsert(Assignment {
                agent_id: agent_id.clone(),
                node_id: target.node_id.clone(),
                assigned_at: self.clock.now_ms(),
                portable_path,
            })
            .await?;

        self.advance_phase(migration_id, MigrationPhase::Completed).await?;
        Ok(())
    }
}
