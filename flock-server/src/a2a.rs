//! A2A wire-level handlers (spec §6): `message/send` (and a minimal
//! `tasks/*` stub), the agent card directory, and the dev/test proxy-send
//! shortcut.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use flock_protocol::{Message, RpcError, RpcResponse, RpcVersion, Task};
use flock_types::FlockError;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn agent_card(State(state): State<Arc<AppState>>) -> Json<flock_protocol::AgentCardDirectory> {
    Json(state.card_directory.read().unwrap().clone())
}

pub async fn a2a_endpoint(
    State(state): State<Arc<AppState>>,
    Path(raw_agent_id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let id = body.get("id").cloned().unwrap_or(serde_json::Value::Null);
    let method = body.get("method").and_then(|m| m.as_str()).unwrap_or("");

    let agent_id = match state.resolve_agent_id(&raw_agent_id) {
        Ok(agent_id) => agent_id,
        Err(e) => return ApiError::from(e).into_response(),
    };

    match method {
        "message/send" => {
            let Some(params) = body.get("params") else {
                return rpc_error(id, -32602, "missing params");
            };
            let Some(raw_message) = params.get("message").cloned() else {
                return rpc_error(id, -32602, "params.message is required");
            };
            let message: Message = match serde_json::from_value(raw_message) {
                Ok(m) => m,
                Err(e) => return rpc_error(id, -32602, &format!("invalid message: {e}")),
            };
            match state.routing.send(&agent_id, message).await {
                Ok(task) => rpc_ok(id, task),
                Err(e) => rpc_error_for(id, e),
            }
        }
        "tasks/get" | "tasks/cancel" => rpc_error(
            id,
            -32601,
            "task tracking is not implemented: message/send responds synchronously",
        ),
        _ => rpc_error(id, -32601, &format!("method not found: {method}")),
    }
}

#[derive(Deserialize)]
struct ProxySendRequest {
    #[serde(rename = "targetAgentID")]
    target_agent_id: String,
    message: Message,
}

pub async fn proxy_send(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProxySendRequest>,
) -> Result<Json<Task>, ApiError> {
    let agent_id = state.resolve_agent_id(&body.target_agent_id)?;
    let task = state.routing.send(&agent_id, body.message).await?;
    Ok(Json(task))
}

fn rpc_ok(id: serde_json::Value, result: Task) -> Response {
    Json(RpcResponse::Ok {
        jsonrpc: RpcVersion,
        result,
        id,
    })
    .into_response()
}

fn rpc_error(id: serde_json::Value, code: i64, message: &str) -> Response {
    let body: RpcResponse<Task> = RpcResponse::Err {
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

fn rpc_error_for(id: serde_json::Value, e: FlockError) -> Response {
    rpc_error(id, -32000, &e.reason())
}
