//! Channels, bridges, the echo tracker, and the inbound/outbound relay
//! handlers (spec §4.4).

pub mod echo;
pub mod mentions;
pub mod service;
pub mod username;

pub use echo::EchoTracker;
pub use mentions::extract_mentions;
pub use service::{
    ChannelService, InboundCtx, InboundEvent, InboundOutcome, OutboundEvent, RequestImmediateTick,
};
pub use username::normalize_username;
