//! Maps a `FlockError` to the exit codes in spec §6: 0 success, 1 generic
//! failure, 2 invalid arguments, 3 migration failed, 4 unauthorized.

use flock_types::{ErrorKind, FlockError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Serve,
    Migrate,
    Home,
}

pub fn exit_code_for(command: CommandKind, error: &FlockError) -> i32 {
    if matches!(error, FlockError::AgentFrozen { .. }) {
        return 4;
    }
    if error.kind() == ErrorKind::Validation {
        return 2;
    }
    if command == CommandKind::Migrate {
        return 3;
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_invalid_arguments() {
        let err = FlockError::InvalidInput("bad".into());
        assert_eq!(exit_code_for(CommandKind::Home, &err), 2);
    }

    #[test]
    fn agent_frozen_is_unauthorized_regardless_of_command() {
        let err = FlockError::AgentFrozen {
            agent_id: "a1".into(),
            migration_id: "m1".into(),
            phase: "FROZEN".into(),
            reason: "migrating".into(),
            estimated_downtime_ms: 1000,
        };
        assert_eq!(exit_code_for(CommandKind::Home, &err), 4);
        assert_eq!(exit_code_for(CommandKind::Migrate, &err), 4);
    }

    #[test]
    fn migration_command_failures_default_to_three() {
        let err = FlockError::Network("timeout".into());
        assert_eq!(exit_code_for(CommandKind::Migrate, &err), 3);
    }

    #[test]
    fn other_commands_default_to_one() {
        let err = FlockError::Internal("boom".into());
        assert_eq!(exit_code_for(CommandKind::Serve, &err), 1);
        assert_eq!(exit_code_for(CommandKind::Home, &err), 1);
    }
}
