//! Shared ids, error taxonomy, and capability traits used across every Flock
//! crate. Nothing here touches persistence or I/O directly.

pub mod audit;
pub mod capability;
pub mod error;
pub mod ids;
pub mod retry;

pub use audit::AuditLevel;
pub use capability::{Clock, ExternalSendOptions, LogLevel, Logger, NullLogger, SendExternal, SessionSend, SystemClock};
pub use error::{ErrorKind, FlockError, FlockResult};
pub use ids::{AgentId, BridgeId, ChannelId, HomeId, MigrationId, NodeId};
pub use retry::RetryPolicy;
