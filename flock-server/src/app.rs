//! Axum app: router wiring and the bind/serve entry points (grounded in the
//! teacher's `serve/src/app.rs` + `serve/src/lib.rs` shape, transplanted
//! from a single WebSocket upgrade route to the A2A/migration HTTP surface).

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::a2a::{a2a_endpoint, agent_card, proxy_send};
use crate::migration_rpc::migration_rpc;
use crate::state::AppState;

const DEFAULT_ADDR: &str = "127.0.0.1:7700";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/a2a/{agentID}", post(a2a_endpoint))
        .route("/.well-known/agent-card.json", get(agent_card))
        .route("/proxy-send", post(proxy_send))
        .route("/migration/rpc", post(migration_rpc))
        .with_state(state)
}

/// Runs the HTTP server on an existing listener. Used by tests (bind to
/// 127.0.0.1:0, then pass the listener in to discover the actual port).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("flock node listening on http://{}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Runs the HTTP server. Listens on `addr` (default 127.0.0.1:7700).
pub async fn run_serve(
    addr: Option<&str>,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr.unwrap_or(DEFAULT_ADDR);
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use flock_migration::LocalMigrationResponder;
    use flock_protocol::{AgentCardDirectory, Message, Role};
    use flock_routing::RoutingClient;
    use flock_store::InMemoryStores;
    use flock_types::{AgentId, FlockResult};
    use std::collections::HashSet;

    struct FixedTable(HashSet<String>);
    impl flock_routing::LocalAgentTable for FixedTable {
        fn contains(&self, agent_id: &AgentId) -> bool {
            self.0.contains(agent_id.as_str())
        }
    }

    struct EchoExecutor;
    #[async_trait::async_trait]
    impl flock_routing::LocalExecutor for EchoExecutor {
        async fn send_local(&self, _agent_id: &AgentId, message: Message) -> FlockResult<flock_protocol::Task> {
            Ok(flock_protocol::Task::completed(
                "t1",
                Message::text(Role::Agent, "r1", format!("echo: {}", message.text_content())),
                vec![],
            ))
        }
    }

    fn test_state() -> Arc<AppState> {
        let stores: Arc<dyn flock_store::Stores> = Arc::new(InMemoryStores::new());
        let table = Arc::new(FixedTable(HashSet::from(["a1".to_string()])));
        let registry = Arc::new(flock_routing::NodeRegistry::new());
        let resolver = Arc::new(flock_routing::PeerResolver::new(table, registry, None));
        let routing = Arc::new(RoutingClient::new(resolver, Arc::new(EchoExecutor)));
        let responder = Arc::new(LocalMigrationResponder::new(
            tempfile::tempdir().unwrap().into_path(),
        ));
        Arc::new(AppState::new(
            stores,
            routing,
            AgentCardDirectory { agents: vec![] },
            responder,
        ))
    }

    #[tokio::test]
    async fn message_send_round_trips_through_the_router() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = test_state();
        tokio::spawn(run_serve_on_listener(listener, state));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://{addr}/a2a/a1"))
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": "message/send",
                "params": {"message": {"kind": "message", "role": "user", "message_id": "m1", "parts": [{"kind": "text", "text": "hi"}]}},
                "id": 1
            }))
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(
            body["result"]["status"]["message"]["parts"][0]["text"],
            "echo: hi"
        );
    }

    #[tokio::test]
    async fn agent_card_endpoint_returns_directory_json() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = test_state();
        tokio::spawn(run_serve_on_listener(listener, state));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let resp = reqwest::get(format!("http://{addr}/.well-known/agent-card.json"))
            .await
            .unwrap();
        let body: AgentCardDirectory = resp.json().await.unwrap();
        assert!(body.agents.is_empty());
    }
}
