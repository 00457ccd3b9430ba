//! A2A wire protocol (spec §6): JSON-RPC 2.0 envelopes, message/task shapes,
//! the agent card directory, and migration RPC bodies.

pub mod a2a;
pub mod card;
pub mod migration;
pub mod rpc;

pub use a2a::{Artifact, Message, MessageSendParams, Part, Role, Task, TaskState, TaskStatus};
pub use card::{AgentCardDirectory, AgentCardEntry, AgentCardMetadata, AgentRole, AgentSkill};
pub use migration::{
    ArchivePayload, MigrationEndpointWire, MigrationRequestParams, MigrationRequestResult,
    RehydrateParams, RehydrateResult, TransferAndVerifyParams, TransferAndVerifyResult,
};
pub use rpc::{RpcError, RpcRequest, RpcResponse, RpcVersion};
