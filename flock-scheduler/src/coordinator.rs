//! Global periodic coordinator (spec §4.5): ticks AWAKE agents on a jittered
//! 60s cadence with bounded concurrency, and supports an out-of-band
//! immediate tick on external @mention.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flock_store::{AgentLoopRecord, AgentLoopUpdate, AuditEntry, ChannelId, ChannelMessageFilter, LoopState, Stores};
use flock_types::{AgentId, AuditLevel, Clock, FlockResult, Logger, SessionSend};
use tokio::sync::{mpsc, Semaphore};

use crate::cursors::ThreadCursors;
use crate::jitter::next_tick_at;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    pub base_tick: Duration,
    pub max_concurrent_ticks: usize,
    pub check_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let base_tick = Duration::from_secs(60);
        Self {
            base_tick,
            max_concurrent_ticks: 4,
            check_interval: base_tick / 2,
        }
    }
}

/// The periodic coordinator. Owns the per-agent thread-cursor map and the
/// immediate-tick request queue; dispatches through a 4-slot bounded pool.
pub struct Coordinator {
    stores: Arc<dyn Stores>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    session: Arc<dyn SessionSend>,
    cursors: Arc<ThreadCursors>,
    config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    immediate_tx: mpsc::UnboundedSender<AgentId>,
    immediate_rx: Mutex<Option<mpsc::UnboundedReceiver<AgentId>>>,
}

impl Coordinator {
    pub fn new(
        stores: Arc<dyn Stores>,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
        session: Arc<dyn SessionSend>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            stores,
            clock,
            logger,
            session,
            cursors: Arc::new(ThreadCursors::new()),
            config,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_ticks)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            immediate_tx: tx,
            immediate_rx: Mutex::new(Some(rx)),
        })
    }

    pub fn cursors(&self) -> Arc<ThreadCursors> {
        self.cursors.clone()
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        self.logger.clone()
    }

    /// Schedules a one-off dispatch irrespective of jitter. Non-blocking;
    /// the forced agent is picked up on the next coordinator check.
    pub fn request_immediate_tick(&self, agent_id: &AgentId) {
        if self.immediate_tx.send(agent_id.clone()).is_err() {
            self.logger.warn(
                "flock_scheduler::coordinator",
                &format!("immediate tick request for {agent_id} dropped: coordinator not running"),
            );
        }
    }

    /// Runs one coordinator check: lists AWAKE agents, selects those whose
    /// jittered next-tick time has arrived (plus any forced by
    /// `request_immediate_tick`), pre-updates `last_tick_at`, and dispatches
    /// through the bounded pool. Returns the number of agents dispatched.
    pub async fn check_once(self: &Arc<Self>) -> FlockResult<usize> {
        let now = self.clock.now_ms();
        let awake = self.stores.agent_loops().list_awake().await?;

        let mut forced: HashSet<String> = HashSet::new();
        if let Some(rx) = self.immediate_rx.lock().unwrap().as_mut() {
            while let Ok(agent_id) = rx.try_recv() {
                forced.insert(agent_id.as_str().to_string());
            }
        }

        let mut dispatched = 0;
        for record in awake {
            let agent_key = record.agent_id.as_str().to_string();
            let due = forced.contains(&agent_key)
                || next_tick_at(&agent_key, record.last_tick_at, self.config.base_tick) <= now;
            if !due {
                continue;
            }
            {
                let mut in_flight = self.in_flight.lock().unwrap();
                if in_flight.contains(&agent_key) {
                    continue;
                }
                in_flight.insert(agent_key.clone());
            }

            // Pre-update before dispatch: the serialization point that
            // prevents two overlapping ticks for the same agent (spec §5).
            self.stores
                .agent_loops()
                .update(
                    &record.agent_id,
                    AgentLoopUpdate {
                        last_tick_at: Some(now),
                        ..Default::default()
                    },
                )
                .await?;

            self.spawn_tick(record, now);
            dispatched += 1;
        }
        Ok(dispatched)
    }

    fn spawn_tick(self: &Arc<Self>, record: AgentLoopRecord, now: i64) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let _permit = coordinator.semaphore.acquire().await;
            let result = coordinator.dispatch_tick(&record, now).await;
            coordinator.in_flight.lock().unwrap().remove(record.agent_id.as_str());
            if let Err(e) = result {
                coordinator.audit_tick_failure(&record.agent_id, &e.to_string(), now).await;
            }
        });
    }

    async fn dispatch_tick(&self, record: &AgentLoopRecord, now: i64) -> FlockResult<()> {
        let message = self.build_tick_message(record, now).await;
        self.session.send(record.agent_id.as_str(), &message).await?;
        Ok(())
    }

    async fn audit_tick_failure(&self, agent_id: &AgentId, detail: &str, now: i64) {
        self.logger.warn(
            "flock_scheduler::coordinator",
            &format!("tick failed for {agent_id}: {detail}"),
        );
        let entry = AuditEntry {
            id: format!("tick-failed-{agent_id}-{now}"),
            timestamp: now,
            agent_id: Some(agent_id.clone()),
            home_id: None,
            action: "scheduler.tick".to_string(),
            level: AuditLevel::Yellow,
            detail: detail.to_string(),
        };
        if let Err(e) = self.stores.audit().insert(entry).await {
            self.logger.warn(
                "flock_scheduler::coordinator",
                &format!("failed to record tick-failure audit for {agent_id}: {e}"),
            );
        }
    }

    /// Spec §4.5: loop state, AWAKE duration, new activity per observed
    /// thread, and a hint that `flock_sleep()` is available.
    async fn build_tick_message(&self, record: &AgentLoopRecord, now: i64) -> String {
        let awake_minutes = ((now - record.awakened_at).max(0)) / 60_000;
        let mut activity_lines = Vec::new();
        for (thread_id, last_seen) in self.cursors.threads_for(&record.agent_id) {
            let Ok(channel_id) = ChannelId::new(&thread_id) else {
                continue;
            };
            let new_messages = self
                .stores
                .channel_messages()
                .list(ChannelMessageFilter {
                    channel_id: Some(channel_id),
                    since_seq: Some(last_seen + 1),
                    ..Default::default()
                })
                .await
                .unwrap_or_default();
            if !new_messages.is_empty() {
                activity_lines.push(format!("- {thread_id}: {} new message(s)", new_messages.len()));
            }
        }

        let activity = if activity_lines.is_empty() {
            "No new activity since your last tick.".to_string()
        } else {
            activity_lines.join("\n")
        };

        format!(
            "loop_state=AWAKE awake_for={awake_minutes}m\n{activity}\n\
             hint: flock_sleep() is available if you have nothing to do right now."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flock_store::{AgentLoopStore, InMemoryStores};
    use flock_types::{ErrorKind, FlockError, NullLogger, SystemClock};
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FakeClock(AtomicI64);
    impl Clock for FakeClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct RecordingSession(Mutex<Vec<String>>);
    #[async_trait::async_trait]
    impl SessionSend for RecordingSession {
        async fn send(&self, agent_id: &str, _text: &str) -> FlockResult<String> {
            self.0.lock().unwrap().push(agent_id.to_string());
            Ok("ok".to_string())
        }
    }

    struct FailingSession;
    #[async_trait::async_trait]
    impl SessionSend for FailingSession {
        async fn send(&self, _agent_id: &str, _text: &str) -> FlockResult<String> {
            Err(FlockError::Timeout(Duration::from_secs(1)))
        }
    }

    #[tokio::test]
    async fn due_awake_agent_is_ticked_and_last_tick_at_advances() {
        let stores = Arc::new(InMemoryStores::new());
        let agent = AgentId::new("a1").unwrap();
        stores.agent_loops().init(&agent, 0).await.unwrap();
        stores
            .agent_loops()
            .update(
                &agent,
                AgentLoopUpdate {
                    state: Some(LoopState::Awake),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let clock = Arc::new(FakeClock(AtomicI64::new(1_000_000)));
        let session = Arc::new(RecordingSession(Mutex::new(Vec::new())));
        let coordinator = Coordinator::new(
            stores.clone(),
            clock.clone(),
            Arc::new(NullLogger),
            session.clone(),
            SchedulerConfig::default(),
        );

        let dispatched = coordinator.check_once().await.unwrap();
        assert_eq!(dispatched, 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(session.0.lock().unwrap().as_slice(), ["a1"]);

        let updated = stores.agent_loops().get(&agent).await.unwrap().unwrap();
        assert_eq!(updated.last_tick_at, 1_000_000);
    }

    #[tokio::test]
    async fn sleeping_agent_is_skipped() {
        let stores = Arc::new(InMemoryStores::new());
        let agent = AgentId::new("a1").unwrap();
        stores.agent_loops().init(&agent, 0).await.unwrap();

        let clock = Arc::new(FakeClock(AtomicI64::new(1_000_000)));
        let session = Arc::new(RecordingSession(Mutex::new(Vec::new())));
        let coordinator = Coordinator::new(
            stores,
            clock,
            Arc::new(NullLogger),
            session.clone(),
            SchedulerConfig::default(),
        );
        let dispatched = coordinator.check_once().await.unwrap();
        assert_eq!(dispatched, 0);
    }

    #[tokio::test]
    async fn tick_failure_produces_yellow_audit_and_does_not_crash() {
        let stores = Arc::new(InMemoryStores::new());
        let agent = AgentId::new("a1").unwrap();
        stores.agent_loops().init(&agent, 0).await.unwrap();
        stores
            .agent_loops()
            .update(
                &agent,
                AgentLoopUpdate {
                    state: Some(LoopState::Awake),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let clock = Arc::new(FakeClock(AtomicI64::new(1_000_000)));
        let coordinator = Coordinator::new(
            stores.clone(),
            clock,
            Arc::new(NullLogger),
            Arc::new(FailingSession),
            SchedulerConfig::default(),
        );
        coordinator.check_once().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let entries = stores
            .audit()
            .list(flock_store::AuditFilter::default())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, AuditLevel::Yellow);
    }

    #[tokio::test]
    async fn immediate_tick_bypasses_jitter_on_next_check() {
        let stores = Arc::new(InMemoryStores::new());
        let agent = AgentId::new("a1").unwrap();
        stores.agent_loops().init(&agent, 0).await.unwrap();
        stores
            .agent_loops()
            .update(
                &agent,
                AgentLoopUpdate {
                    state: Some(LoopState::Awake),
                    last_tick_at: Some(1_000_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let clock = Arc::new(FakeClock(AtomicI64::new(1_000_001)));
        let session = Arc::new(RecordingSession(Mutex::new(Vec::new())));
        let coordinator = Coordinator::new(
            stores,
            clock,
            Arc::new(NullLogger),
            session.clone(),
            SchedulerConfig::default(),
        );
        assert_eq!(coordinator.check_once().await.unwrap(), 0);
        coordinator.request_immediate_tick(&agent);
        assert_eq!(coordinator.check_once().await.unwrap(), 1);
    }
}
