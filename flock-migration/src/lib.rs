//! Migration engine and orchestrator (spec §4.6): moves an agent's home
//! from a source node to a target node through a ten-phase DAG, with
//! rollback, a frozen guard, and post-migration file helpers.

pub mod frozen_guard;
pub mod orchestrator;
pub mod phases;
pub mod post_migration;
pub mod responder;
pub mod snapshot;
pub mod transport;

pub use frozen_guard::FrozenGuard;
pub use orchestrator::MigrationService;
pub use phases::{
    allowed_targets, check_transition, estimated_downtime, is_frozen_phase, PhaseTimeouts,
    MAX_PORTABLE_SIZE_BYTES, PHASE_TIMEOUTS,
};
pub use responder::{LocalMigrationResponder, MigrationResponder};
pub use snapshot::{build_archive, extract_archive, verify_archive, Archive};
pub use transport::{HttpMigrationTransport, InProcessTransport, MigrationTransport};
