//! Process-wide state handed to every axum handler (spec §9: construct the
//! capability graph once at startup, pass it down, never reach for globals).

use std::sync::{Arc, RwLock};

use flock_migration::MigrationResponder;
use flock_protocol::AgentCardDirectory;
use flock_routing::RoutingClient;
use flock_store::Stores;
use flock_types::AgentId;

#[derive(Clone)]
pub struct AppState {
    pub stores: Arc<dyn Stores>,
    pub routing: Arc<RoutingClient>,
    pub card_directory: Arc<RwLock<AgentCardDirectory>>,
    pub migration_responder: Arc<dyn MigrationResponder>,
}

impl AppState {
    pub fn new(
        stores: Arc<dyn Stores>,
        routing: Arc<RoutingClient>,
        card_directory: AgentCardDirectory,
        migration_responder: Arc<dyn MigrationResponder>,
    ) -> Self {
        Self {
            stores,
            routing,
            card_directory: Arc::new(RwLock::new(card_directory)),
            migration_responder,
        }
    }

    pub fn resolve_agent_id(&self, raw: &str) -> Result<AgentId, flock_types::FlockError> {
        AgentId::new(raw)
    }
}
