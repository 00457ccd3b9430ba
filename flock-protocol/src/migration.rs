//! Migration JSON-RPC bodies (spec §6: `migration/request`,
//! `migration/transferAndVerify`, `migration/rehydrate`).

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationEndpointWire {
    pub node_id: String,
    pub home_id: String,
    pub endpoint: String,
}

/// `migration/request` params: target-side `notifyRequest`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationRequestParams {
    pub migration_id: String,
    pub agent_id: String,
    pub reason: String,
    pub source: MigrationEndpointWire,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationRequestResult {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Archive payload. Carried as base64 on the wire; binary in-process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchivePayload {
    pub archive_base64: String,
    pub digest_hex: String,
    pub size_bytes: u64,
}

/// `migration/transferAndVerify` params.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferAndVerifyParams {
    pub migration_id: String,
    pub agent_id: String,
    pub archive: ArchivePayload,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferAndVerifyResult {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `migration/rehydrate` params.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RehydrateParams {
    pub migration_id: String,
    pub agent_id: String,
    pub target_home_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RehydrateResult {
    pub rehydrated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
