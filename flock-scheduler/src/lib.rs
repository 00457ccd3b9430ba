//! Work-loop scheduler (spec §4.5): periodic, jittered ticking of AWAKE
//! agents with bounded concurrency, plus an immediate-tick escape hatch for
//! channel mentions.

pub mod coordinator;
pub mod cursors;
pub mod jitter;

pub use coordinator::{Coordinator, SchedulerConfig};
pub use cursors::ThreadCursors;
pub use jitter::{jitter_ms, next_tick_at};

use std::sync::Arc;

use flock_channels::RequestImmediateTick;
use flock_types::AgentId;

impl RequestImmediateTick for Coordinator {
    fn request_immediate_tick(&self, agent_id: &AgentId) {
        Coordinator::request_immediate_tick(self, agent_id)
    }
}

/// A running coordinator loop, spawned on a fixed `check_interval` cadence.
/// Dropping the handle without calling `stop()` leaves the loop running
/// until the process exits, matching the teacher's detached-task convention
/// for background workers.
pub struct SchedulerHandle {
    coordinator: Arc<Coordinator>,
    task: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn coordinator(&self) -> Arc<Coordinator> {
        self.coordinator.clone()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

/// Spawns the periodic `check_once` loop at `config.check_interval`.
pub fn spawn(coordinator: Arc<Coordinator>, check_interval: std::time::Duration) -> SchedulerHandle {
    let loop_coordinator = coordinator.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(check_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = loop_coordinator.check_once().await {
                loop_coordinator
                    .logger()
                    .warn("flock_scheduler", &format!("coordinator check failed: {e}"));
            }
        }
    });
    SchedulerHandle { coordinator, task }
}
