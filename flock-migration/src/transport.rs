//! Migration transport abstraction (spec §4.6): the orchestrator calls
//! `MigrationTransport` without knowing whether the target is reached
//! in-process (tests, same-node dev setups) or over HTTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use flock_protocol::{
    MigrationRequestParams, MigrationRequestResult, RehydrateParams, RehydrateResult, RpcRequest,
    RpcResponse, TransferAndVerifyParams, TransferAndVerifyResult,
};
use flock_types::{FlockError, FlockResult};

use crate::responder::MigrationResponder;

#[async_trait]
pub trait MigrationTransport: Send + Sync {
    async fn notify_request(&self, params: MigrationRequestParams) -> FlockResult<MigrationRequestResult>;
    async fn transfer_and_verify(
        &self,
        params: TransferAndVerifyParams,
    ) -> FlockResult<TransferAndVerifyResult>;
    async fn rehydrate(&self, params: RehydrateParams) -> FlockResult<RehydrateResult>;
}

/// Direct in-process dispatch to a target-side responder, skipping
/// serialization entirely. The test-mode and same-node-dev transport.
pub struct InProcessTransport {
    responder: Arc<dyn MigrationResponder>,
}

impl InProcessTransport {
    pub fn new(responder: Arc<dyn MigrationResponder>) -> Self {
        Self { responder }
    }
}

#[async_trait]
impl MigrationTransport for InProcessTransport {
    async fn notify_request(&self, params: MigrationRequestParams) -> FlockResult<MigrationRequestResult> {
        self.responder.notify_request(params).await
    }

    async fn transfer_and_verify(
        &self,
        params: TransferAndVerifyParams,
    ) -> FlockResult<TransferAndVerifyResult> {
        self.responder.transfer_and_verify(params).await
    }

    async fn rehydrate(&self, params: RehydrateParams) -> FlockResult<RehydrateResult> {
        self.responder.rehydrate(params).await
    }
}

/// JSON-RPC 2.0 over HTTP, same transport base as the A2A surface (spec
/// §6: "Migration JSON-RPC (same transport)").
pub struct HttpMigrationTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpMigrationTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with a fixed timeout"),
            endpoint: endpoint.into(),
        }
    }

    async fn call<P: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> FlockResult<R> {
        let request = RpcRequest::new(method, params, serde_json::json!(1));
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| FlockError::Network(e.to_string()))?;
        let body: RpcResponse<R> = resp
            .json()
            .await
            .map_err(|e| FlockError::Network(e.to_string()))?;
        match body {
            RpcResponse::Ok { result, .. } => Ok(result),
            RpcResponse::Err { error, .. } => Err(FlockError::Network(error.message)),
        }
    }
}

#[async_trait]
impl MigrationTransport for HttpMigrationTransport {
    async fn notify_request(&self, params: MigrationRequestParams) -> FlockResult<MigrationRequestResult> {
        self.call("migration/request", params).await
    }

    async fn transfer_and_verify(
        &self,
        params: TransferAndVerifyParams,
    ) -> FlockResult<TransferAndVerifyResult> {
        self.call("migration/transferAndVerify", params).await
    }

    async fn rehydrate(&self, params: RehydrateParams) -> FlockResult<RehydrateResult> {
        self.call("migration/rehydrate", params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::LocalMigrationResponder;

    #[tokio::test]
    async fn in_process_transport_dispatches_to_responder() {
        let homes_root = tempfile::tempdir().unwrap();
        let responder = Arc::new(LocalMigrationResponder::new(homes_root.path().to_path_buf()));
        let transport = InProcessTransport::new(responder);

        let accept = transport
            .notify_request(MigrationRequestParams {
                migration_id: "m1".into(),
                agent_id: "a1".into(),
                reason: "rebalance".into(),
                source: flock_protocol::MigrationEndpointWire {
                    node_id: "n1".into(),
                    home_id: "a1@n1".into(),
                    endpoint: "http://n1".into(),
                },
            })
            .await
            .unwrap();
        assert!(accept.accepted);
    }
}
