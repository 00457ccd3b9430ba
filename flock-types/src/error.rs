//! Error taxonomy shared by every Flock crate (spec §7).
//!
//! Kinds: Validation, NotFound, Conflict, Transient, Fatal. Callers branch on
//! `FlockError::kind()` to decide retry behavior; the component that owns an
//! operation is responsible for actually retrying (this type only classifies).

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Transient,
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum FlockError {
    #[error("invalid {kind}: {value:?} does not match [A-Za-z0-9_-]+")]
    InvalidId { kind: &'static str, value: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid transition for home {home_id}: {from} -> {to} is not allowed (allowed from {from}: {allowed})")]
    InvalidTransition {
        home_id: String,
        from: String,
        to: String,
        allowed: String,
    },

    #[error("invalid migration phase transition for {migration_id}: {from} -> {to} is not allowed")]
    InvalidPhase {
        migration_id: String,
        from: String,
        to: String,
    },

    #[error("home not found: {0}")]
    HomeNotFound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("migration ticket not found: {0}")]
    TicketNotFound(String),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("agent {agent_id} is frozen by migration {migration_id} (phase {phase}), estimated downtime {estimated_downtime_ms}ms: {reason}")]
    AgentFrozen {
        agent_id: String,
        migration_id: String,
        phase: String,
        reason: String,
        estimated_downtime_ms: u64,
    },

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl FlockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlockError::InvalidId { .. }
            | FlockError::InvalidInput(_)
            | FlockError::InvalidTransition { .. }
            | FlockError::InvalidPhase { .. } => ErrorKind::Validation,
            FlockError::HomeNotFound(_)
            | FlockError::AgentNotFound(_)
            | FlockError::TicketNotFound(_)
            | FlockError::ChannelNotFound(_) => ErrorKind::NotFound,
            FlockError::AlreadyExists(_) | FlockError::AgentFrozen { .. } => ErrorKind::Conflict,
            FlockError::Duplicate(_) => ErrorKind::Conflict,
            FlockError::Timeout(_) | FlockError::Network(_) | FlockError::VerificationFailed(_) => {
                ErrorKind::Transient
            }
            FlockError::Internal(_) | FlockError::Storage(_) => ErrorKind::Fatal,
        }
    }

    /// One-line human reason, independent of the machine-readable kind.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

pub type FlockResult<T> = Result<T, FlockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_classify_as_specced() {
        assert_eq!(
            FlockError::InvalidId {
                kind: "AgentId",
                value: "x".into()
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            FlockError::HomeNotFound("h".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            FlockError::AgentFrozen {
                agent_id: "a".into(),
                migration_id: "m".into(),
                phase: "FROZEN".into(),
                reason: "migrating".into(),
                estimated_downtime_ms: 1000,
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(FlockError::Network("x".into()).kind(), ErrorKind::Transient);
        assert_eq!(FlockError::Internal("x".into()).kind(), ErrorKind::Fatal);
    }

    #[test]
    fn invalid_transition_names_both_states_and_allowed_set() {
        let err = FlockError::InvalidTransition {
            home_id: "a1@n1".into(),
            from: "UNASSIGNED".into(),
            to: "ACTIVE".into(),
            allowed: "PROVISIONING, RETIRED".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("UNASSIGNED"));
        assert!(msg.contains("ACTIVE"));
        assert!(msg.contains("PROVISIONING, RETIRED"));
    }
}
