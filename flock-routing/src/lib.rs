//! Agent routing (spec §4.3): `agentID -> LocalRoute | RemoteRoute`,
//! topology factories (peer, central), and the topology-agnostic client.

pub mod client;
pub mod registry;
pub mod resolver;

pub use client::{LocalExecutor, RoutingClient};
pub use registry::{NodeEntry, NodeRegistry, NodeStatus};
pub use resolver::{AssignmentLookup, CentralResolver, LocalAgentTable, ParentRegistryClient, PeerResolver, Resolve, Route};
