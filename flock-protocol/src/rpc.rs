//! Generic JSON-RPC 2.0 envelope (spec §6: "A2A protocol (wire-level)").

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest<P> {
    pub jsonrpc: RpcVersion,
    pub method: String,
    pub params: P,
    pub id: serde_json::Value,
}

impl<P> RpcRequest<P> {
    pub fn new(method: impl Into<String>, params: P, id: serde_json::Value) -> Self {
        Self {
            jsonrpc: RpcVersion,
            method: method.into(),
            params,
            id,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResponse<R> {
    Ok {
        jsonrpc: RpcVersion,
        result: R,
        id: serde_json::Value,
    },
    Err {
        jsonrpc: RpcVersion,
        error: RpcError,
        id: serde_json::Value,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Always serializes/deserializes as the literal string `"2.0"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RpcVersion;

impl Serialize for RpcVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for RpcVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s != "2.0" {
            return Err(serde::de::Error::custom(format!("unsupported jsonrpc version {s}")));
        }
        Ok(RpcVersion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips_through_json() {
        let req = RpcRequest::new("message/send", serde_json::json!({"x": 1}), serde_json::json!(1));
        let text = serde_json::to_string(&req).unwrap();
        assert!(text.contains("\"jsonrpc\":\"2.0\""));
        let parsed: RpcRequest<serde_json::Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.method, "message/send");
    }

    #[test]
    fn response_err_variant_roundtrips() {
        let resp: RpcResponse<serde_json::Value> = RpcResponse::Err {
            jsonrpc: RpcVersion,
            error: RpcError {
                code: -32000,
                message: "boom".into(),
                data: None,
            },
            id: serde_json::json!(1),
        };
        let text = serde_json::to_string(&resp).unwrap();
        let parsed: RpcResponse<serde_json::Value> = serde_json::from_str(&text).unwrap();
        match parsed {
            RpcResponse::Err { error, .. } => assert_eq!(error.message, "boom"),
            RpcResponse::Ok { .. } => panic!("expected error variant"),
        }
    }
}
