//! Migration phase DAG (spec §4.6): allowed transitions, terminal phases,
//! and per-phase timeout/downtime constants (spec §6).

use std::time::Duration;

use flock_store::MigrationPhase;

/// `from -> allowed-to` table. Any non-terminal phase may also move to
/// `ABORTED` or `FAILED` via `rollback`, which is not part of this table
/// (rollback bypasses the forward DAG check).
pub fn allowed_targets(from: MigrationPhase) -> &'static [MigrationPhase] {
    use MigrationPhase::*;
    match from {
        Requested => &[Authorized],
        Authorized => &[Freezing],
        Freezing => &[Frozen],
        Frozen => &[Snapshotting],
        Snapshotting => &[Transferring],
        Transferring => &[Verifying],
        Verifying => &[Rehydrating],
        Rehydrating => &[Finalizing],
        Finalizing => &[Completed],
        Completed | Aborted | Failed => &[],
    }
}

fn allowed_set_str(from: MigrationPhase) -> String {
    allowed_targets(from)
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn check_transition(
    migration_id: &str,
    from: MigrationPhase,
    to: MigrationPhase,
) -> Result<(), flock_types::FlockError> {
    if allowed_targets(from).contains(&to) {
        return Ok(());
    }
    Err(flock_types::FlockError::InvalidPhase {
        migration_id: migration_id.to_string(),
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
    })
}

/// Phases during which the frozen guard rejects operations on the agent.
pub fn is_frozen_phase(phase: MigrationPhase) -> bool {
    matches!(
        phase,
        MigrationPhase::Freezing
            | MigrationPhase::Frozen
            | MigrationPhase::Snapshotting
            | MigrationPhase::Transferring
            | MigrationPhase::Verifying
            | MigrationPhase::Rehydrating
    )
}

/// Rough estimated downtime for the frozen guard's error message, biased
/// towards the phase's own timeout (later phases imply more work already
/// sunk, hence a longer remaining estimate).
pub fn estimated_downtime(phase: MigrationPhase) -> Duration {
    match phase {
        MigrationPhase::Freezing => PHASE_TIMEOUTS.freezing,
        MigrationPhase::Frozen => PHASE_TIMEOUTS.snapshotting,
        MigrationPhase::Snapshotting => PHASE_TIMEOUTS.snapshotting,
        MigrationPhase::Transferring => PHASE_TIMEOUTS.transferring,
        MigrationPhase::Verifying => PHASE_TIMEOUTS.verifying,
        MigrationPhase::Rehydrating => PHASE_TIMEOUTS.rehydrating,
        _ => Duration::from_millis(0),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PhaseTimeouts {
    pub freezing: Duration,
    pub snapshotting: Duration,
    pub transferring: Duration,
    pub verifying: Duration,
    pub rehydrating: Duration,
    pub finalizing: Duration,
}

/// Defaults from spec §6.
pub const PHASE_TIMEOUTS: PhaseTimeouts = PhaseTimeouts {
    freezing: Duration::from_millis(30_000),
    snapshotting: Duration::from_millis(300_000),
    transferring: Duration::from_millis(300_000),
    verifying: Duration::from_millis(60_000),
    rehydrating: Duration::from_millis(300_000),
    finalizing: Duration::from_millis(30_000),
};

pub const MAX_PORTABLE_SIZE_BYTES: u64 = 512 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_dag_is_strictly_ordered() {
        use MigrationPhase::*;
        let order = [
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
        ];
        for window in order.windows(2) {
            assert!(check_transition("m1", window[0], window[1]).is_ok());
        }
    }

    #[test]
    fn skipping_a_phase_is_rejected() {
        let err = check_transition("m1", MigrationPhase::Requested, MigrationPhase::Frozen).unwrap_err();
        assert_eq!(err.kind(), flock_types::ErrorKind::Validation);
    }

    #[test]
    fn terminal_phases_accept_no_further_transitions() {
        for phase in [MigrationPhase::Completed, MigrationPhase::Aborted, MigrationPhase::Failed] {
            assert!(allowed_targets(phase).is_empty());
        }
    }

    #[test]
    fn frozen_phase_set_matches_spec() {
        use MigrationPhase::*;
        for phase in [Freezing, Frozen, Snapshotting, Transferring, Verifying, Rehydrating] {
            assert!(is_frozen_phase(phase));
        }
        for phase in [Requested, Authorized, Finalizing, Completed, Aborted, Failed] {
            assert!(!is_frozen_phase(phase));
        }
    }
}
