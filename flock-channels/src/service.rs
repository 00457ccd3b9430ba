//! Channel CRUD, bridge CRUD with archive sync, and the inbound/outbound
//! relay handlers (spec §4.4).

use std::sync::Arc;

use async_trait::async_trait;
use flock_store::{
    Bridge, BridgeFilter, BridgeStore, BridgeUpdate, Channel, ChannelFilter, ChannelMessage,
    ChannelMessageFilter, ChannelMessageStore, ChannelStore, ChannelUpdate, LoopState, Stores,
};
use flock_types::{
    AgentId, BridgeId, ChannelId, Clock, ExternalSendOptions, FlockError, FlockResult, Logger,
    SendExternal,
};

use crate::echo::EchoTracker;
use crate::mentions::extract_mentions;
use crate::username::normalize_username;

const SUPPORTED_PLATFORMS: [&str; 2] = ["discord", "slack"];

/// Inbound context (spec §4.4: `ctx.platform`, `ctx.conversationID`).
#[derive(Clone, Debug)]
pub struct InboundCtx {
    pub platform: String,
    pub conversation_id: String,
}

/// Inbound event (spec §4.4: `event.from`, `event.text`).
#[derive(Clone, Debug)]
pub struct InboundEvent {
    pub from: String,
    pub text: String,
}

#[derive(Clone, Debug)]
pub enum InboundOutcome {
    Appended { message: ChannelMessage, awakened: Vec<AgentId> },
    Dropped { reason: String },
}

#[derive(Clone, Debug)]
pub struct OutboundEvent {
    pub channel_id: ChannelId,
    pub message: String,
    pub agent_id: String,
    pub seq: Option<u64>,
}

/// Notified when a mentioned agent transitions SLEEP -> AWAKE (spec §4.4
/// step 6: "request an immediate scheduler tick"). Kept as a narrow,
/// non-blocking capability so `flock-channels` doesn't depend on
/// `flock-scheduler`.
pub trait RequestImmediateTick: Send + Sync {
    fn request_immediate_tick(&self, agent_id: &AgentId);
}

pub struct ChannelService {
    stores: Arc<dyn Stores>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    echo: Arc<EchoTracker>,
    external: Arc<dyn SendExternal>,
    scheduler: Arc<dyn RequestImmediateTick>,
}

impl ChannelService {
    pub fn new(
        stores: Arc<dyn Stores>,
        clock: Arc<dyn Clock>,
        logger: Arc<dyn Logger>,
        echo: Arc<EchoTracker>,
        external: Arc<dyn SendExternal>,
        scheduler: Arc<dyn RequestImmediateTick>,
    ) -> Self {
        Self {
            stores,
            clock,
            logger,
            echo,
            external,
            scheduler,
        }
    }

    pub async fn create_channel(&self, channel: Channel) -> FlockResult<()> {
        self.stores.channels().insert(channel).await
    }

    pub async fn list_channels(&self, filter: ChannelFilter) -> FlockResult<Vec<Channel>> {
        self.stores.channels().list(filter).await
    }

    pub async fn create_bridge(&self, bridge: Bridge) -> FlockResult<()> {
        self.stores.bridges().insert(bridge).await
    }

    /// Archives a channel and deactivates its active bridges, posting a
    /// best-effort final notification through each. Notification failures
    /// never prevent the archive or the deactivation (spec §4.4 "archive
    /// sync").
    pub async fn archive_channel(&self, channel_id: &ChannelId) -> FlockResult<Channel> {
        let channel = self
            .stores
            .channels()
            .update(
                channel_id,
                ChannelUpdate {
                    archived: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let active_bridges = self
            .stores
            .bridges()
            .list(BridgeFilter {
                channel_id: Some(channel_id.clone()),
                active: Some(true),
                ..Default::default()
            })
            .await?;

        for bridge in active_bridges {
            let deactivated = self
                .stores
                .bridges()
                .update(
                    &bridge.bridge_id,
                    BridgeUpdate { active: Some(false) },
                )
                .await?;
            if let Err(e) = self
                .external
                .send_external(
                    &deactivated.platform,
                    &deactivated.external_channel_id,
                    &format!("channel #{} has been archived", channel.name),
                    ExternalSendOptions::default(),
                )
                .await
            {
                self.logger.warn(
                    "flock_channels::archive",
                    &format!("final notification failed for bridge {}: {e}", deactivated.bridge_id),
                );
            }
        }

        Ok(channel)
    }

    /// Spec §4.4 `handleInbound`.
    pub async fn handle_inbound(&self, event: InboundEvent, ctx: InboundCtx) -> FlockResult<InboundOutcome> {
        if !SUPPORTED_PLATFORMS.contains(&ctx.platform.as_str()) || ctx.conversation_id.is_empty() {
            return Err(FlockError::InvalidInput(format!(
                "unsupported inbound context: platform={:?} conversation_id={:?}",
                ctx.platform, ctx.conversation_id
            )));
        }

        let bridges = self
            .stores
            .bridges()
            .list(BridgeFilter {
                platform: Some(ctx.platform.clone()),
                external_channel_id: Some(ctx.conversation_id.clone()),
                active: Some(true),
                ..Default::default()
            })
            .await?;
        let Some(bridge) = bridges.into_iter().next() else {
            self.logger.warn(
                "flock_channels::inbound",
                &format!("no active bridge for {}/{}", ctx.platform, ctx.conversation_id),
            );
            return Ok(InboundOutcome::Dropped {
                reason: "no active bridge".to_string(),
            });
        };

        let channel = match self.stores.channels().get(&bridge.channel_id).await? {
            Some(c) if !c.archived => c,
            Some(_) => {
                self.logger.warn(
                    "flock_channels::inbound",
                    &format!("bridge {} targets archived channel {}", bridge.bridge_id, bridge.channel_id),
                );
                return Ok(InboundOutcome::Dropped {
                    reason: "channel archived".to_string(),
                });
            }
            None => {
                self.logger.warn(
                    "flock_channels::inbound",
                    &format!("bridge {} targets missing channel {}", bridge.bridge_id, bridge.channel_id),
                );
                return Ok(InboundOutcome::Dropped {
                    reason: "channel not found".to_string(),
                });
            }
        };

        let agent_id = format!("human:{}", normalize_username(&event.from));
        let now = self.clock.now_ms();
        let message = self
            .stores
            .channel_messages()
            .append(&channel.channel_id, &agent_id, &event.text, now)
            .await?;
        self.echo.mark_bridged_in(channel.channel_id.as_str(), message.seq);

        let mut members = channel.members.clone();
        let added_human = !members.iter().any(|m| m == &agent_id);
        if added_human {
            members.push(agent_id.clone());
            self.stores
                .channels()
                .update(
                    &channel.channel_id,
                    ChannelUpdate {
                        members: Some(members.clone()),
                        ..Default::default()
                    },
                )
                .await?;
        }

        let mentioned = extract_mentions(&event.text, &members);
        let mut awakened = Vec::new();
        for mentioned_id in mentioned {
            let Ok(agent) = AgentId::new(mentioned_id) else {
                continue;
            };
            if let Err(e) = self.wake_if_sleeping(&agent).await {
                self.logger.warn(
                    "flock_channels::inbound",
                    &format!("failed to wake {agent}: {e}"),
                );
                continue;
            }
            awakened.push(agent);
        }

        Ok(InboundOutcome::Appended { message, awakened })
    }

    async fn wake_if_sleeping(&self, agent_id: &AgentId) -> FlockResult<bool> {
        let Some(record) = self.stores.agent_loops().get(agent_id).await? else {
            return Ok(false);
        };
        if record.state != LoopState::Sleep {
            return Ok(false);
        }
        let now = self.clock.now_ms();
        self.stores
            .agent_loops()
            .update(
                agent_id,
                flock_store::AgentLoopUpdate {
                    state: Some(LoopState::Awake),
                    awakened_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;
        self.scheduler.request_immediate_tick(agent_id);
        Ok(true)
    }

    /// Spec §4.4 `handleOutbound`.
    pub async fn handle_outbound(&self, event: OutboundEvent) -> FlockResult<usize> {
        if event.agent_id.starts_with("human:") {
            return Ok(0);
        }

        let bridges = self
            .stores
            .bridges()
            .list(BridgeFilter {
                channel_id: Some(event.channel_id.clone()),
                active: Some(true),
                ..Default::default()
            })
            .await?;

        let mut relayed = 0;
        for bridge in bridges {
            if let Some(seq) = event.seq {
                if self.echo.was_bridged_in(event.channel_id.as_str(), seq) {
                    continue;
                }
            }
            let options = ExternalSendOptions {
                display_name: Some(event.agent_id.clone()),
                webhook_url: bridge.webhook_url.clone(),
                account_id: bridge.account_id.clone(),
            };
            match self
                .external
                .send_external(&bridge.platform, &bridge.external_channel_id, &event.message, options)
                .await
            {
                Ok(()) => relayed += 1,
                Err(e) => {
                    self.logger.warn(
                        "flock_channels::outbound",
                        &format!("send to bridge {} failed: {e}", bridge.bridge_id),
                    );
                }
            }
        }
        Ok(relayed)
    }

    pub async fn list_messages(&self, filter: ChannelMessageFilter) -> FlockResult<Vec<ChannelMessage>> {
        self.stores.channel_messages().list(filter).await
    }

    pub fn echo_tracker(&self) -> Arc<EchoTracker> {
        self.echo.clone()
    }
}
