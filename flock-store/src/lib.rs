//! Persistence layer (spec §4.1): store traits plus an in-memory and a
//! SQLite implementation, bundled behind the `Stores` trait object.

pub mod filters;
pub mod in_memory;
pub mod models;
pub mod sqlite;
pub mod traits;

pub use filters::{
    AssignmentFilter, AuditFilter, BridgeFilter, ChannelFilter, ChannelMessageFilter, HomeFilter,
    MigrationTicketFilter, TransitionFilter,
};
pub use in_memory::InMemoryStores;
pub use models::{
    AgentLoopRecord, Assignment, AuditEntry, Bridge, Channel, ChannelMessage, Home, HomeState,
    HomeTransition, LoopState, MigrationEndpoint, MigrationPhase, MigrationTicket,
};
pub use sqlite::SqliteStores;
pub use traits::{
    AgentLoopStore, AgentLoopUpdate, AssignmentStore, AuditStore, BridgeStore, BridgeUpdate,
    ChannelMessageStore, ChannelStore, ChannelUpdate, HomeStore, HomeUpdate, MigrationTicketStore,
    MigrationTicketUpdate, Stores, TransitionStore,
};
