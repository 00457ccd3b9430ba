//! Topology-agnostic dispatch: given a `Resolve`, route local calls directly
//! to the in-process executor and remote calls as A2A `message/send` POSTs
//! (spec §4.3 "the client is topology-agnostic").

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flock_protocol::{Message, MessageSendParams, RpcRequest, RpcResponse, Task};
use flock_types::{AgentId, FlockError, FlockResult};

use crate::resolver::{Resolve, Route};

/// The in-process executor a `Route::Local` call is dispatched to, with no
/// serialization round-trip.
#[async_trait]
pub trait LocalExecutor: Send + Sync {
    async fn send_local(&self, agent_id: &AgentId, message: Message) -> FlockResult<Task>;
}

pub struct RoutingClient {
    resolver: Arc<dyn Resolve>,
    local: Arc<dyn LocalExecutor>,
    http: reqwest::Client,
}

impl RoutingClient {
    pub fn new(resolver: Arc<dyn Resolve>, local: Arc<dyn LocalExecutor>) -> Self {
        Self {
            resolver,
            local,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with a fixed timeout"),
        }
    }

    pub async fn send(&self, agent_id: &AgentId, message: Message) -> FlockResult<Task> {
        match self.resolver.resolve(agent_id).await? {
            Route::Local => self.local.send_local(agent_id, message).await,
            Route::Remote { endpoint, .. } => self.send_remote(&endpoint, agent_id, message).await,
        }
    }

    async fn send_remote(&self, endpoint: &str, agent_id: &AgentId, message: Message) -> FlockResult<Task> {
        let url = format!("{}/a2a/{}", endpoint.trim_end_matches('/'), agent_id.as_str());
        let request = RpcRequest::new(
            "message/send",
            MessageSendParams { message },
            serde_json::json!(1),
        );
        let resp = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| FlockError::Network(e.to_string()))?;
        let body: RpcResponse<Task> = resp
            .json()
            .await
            .map_err(|e| FlockError::Network(e.to_string()))?;
        match body {
            RpcResponse::Ok { result, .. } => Ok(result),
            RpcResponse::Err { error, .. } => Err(FlockError::Network(error.message)),
        }
    }
}
