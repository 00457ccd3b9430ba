//! Migration JSON-RPC endpoint (spec §6): the HTTP counterpart of
//! `flock_migration::MigrationTransport`, answered by this node's
//! `MigrationResponder`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use flock_protocol::{RpcError, RpcResponse, RpcVersion};

use crate::state::AppState;

pub async fn migration_rpc(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let id = body.get("id").cloned().unwrap_or(serde_json::Value::Null);
    let method = body.get("method").and_then(|m| m.as_str()).unwrap_or("");
    let params = body.get("params").cloned().unwrap_or(serde_json::Value::Null);

    match method {
        "migration/request" => dispatch(id, params, |p| async move { state.migration_responder.notify_request(p).await }).await,
        "migration/transferAndVerify" => {
            dispatch(id, params, |p| async move { state.migration_responder.transfer_and_verify(p).await }).await
        }
        "migration/rehydrate" => dispatch(id, params, |p| async move { state.migration_responder.rehydrate(p).await }).await,
        _ => rpc_error(id, -32601, &format!("method not found: {method}")),
    }
}

async fn dispatch<P, R, F, Fut>(id: serde_json::Value, params: serde_json::Value, f: F) -> Response
where
    P: serde::de::DeserializeOwned,
    R: serde::Serialize,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = flock_types::FlockResult<R>>,
{
    let parsed: P = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => return rpc_error(id, -32602, &format!("invalid params: {e}")),
    };
    match f(parsed).await {
        Ok(result) => (
            StatusCode::OK,
            Json(RpcResponse::Ok {
                jsonrpc: RpcVersion,
                result,
                id,
            }),
        )
            .into_response(),
        Err(e) => rpc_error(id, -32000, &e.reason()),
    }
}

fn rpc_error(id: serde_json::Value, code: i64, message: &str) -> Response {
    let body: RpcResponse<()> = RpcResponse::Err {
        jsonrpc: RpcVersion,
        error: RpcError {
            code,
            message: message.to_string(),
            data: None,
        },
        id,
    };
    (StatusCode::OK, Json(body)).into_response()
}
