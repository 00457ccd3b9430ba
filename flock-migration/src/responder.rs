//! Target-side migration business logic (spec §4.6 "transport abstraction"):
//! the same code path answers a `notifyRequest`/`transferAndVerify`/
//! `rehydrate` call whether it arrived in-process or over HTTP.

use std::path::PathBuf;

use async_trait::async_trait;

use base64::Engine;
use flock_protocol::{
    MigrationRequestParams, MigrationRequestResult, RehydrateParams, RehydrateResult,
    TransferAndVerifyParams, TransferAndVerifyResult,
};
use flock_types::{FlockError, FlockResult};

use crate::phases::MAX_PORTABLE_SIZE_BYTES;
use crate::snapshot::{extract_archive, verify_archive};

#[async_trait]
pub trait MigrationResponder: Send + Sync {
    async fn notify_request(&self, params: MigrationRequestParams) -> FlockResult<MigrationRequestResult>;
    async fn transfer_and_verify(
        &self,
        params: TransferAndVerifyParams,
    ) -> FlockResult<TransferAndVerifyResult>;
    async fn rehydrate(&self, params: RehydrateParams) -> FlockResult<RehydrateResult>;
}

/// Writes rehydrated homes under `homes_root/<homeID>`. `homeID` is already
/// validated path-safe by construction (`HomeId`), so this join never
/// escapes `homes_root`.
pub struct LocalMigrationResponder {
    homes_root: PathBuf,
    max_portable_size_bytes: u64,
    last_verified: tokio::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl LocalMigrationResponder {
    pub fn new(homes_root: PathBuf) -> Self {
        Self {
            homes_root,
            max_portable_size_bytes: MAX_PORTABLE_SIZE_BYTES,
            last_verified: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn with_max_portable_size(mut self, max_portable_size_bytes: u64) -> Self {
        self.max_portable_size_bytes = max_portable_size_bytes;
        self
    }
}

#[async_trait]
impl MigrationResponder for LocalMigrationResponder {
    async fn notify_request(&self, params: MigrationRequestParams) -> FlockResult<MigrationRequestResult> {
        tracing::info!(
            migration_id = %params.migration_id,
            agent_id = %params.agent_id,
            "accepted migration notify_request"
        );
        Ok(MigrationRequestResult {
            accepted: true,
            reason: None,
        })
    }

    async fn transfer_and_verify(
        &self,
        params: TransferAndVerifyParams,
    ) -> FlockResult<TransferAndVerifyResult> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&params.archive.archive_base64)
            .map_err(|e| FlockError::Network(format!("invalid base64 archive payload: {e}")))?;

        if let Err(e) = verify_archive(&bytes, &params.archive.digest_hex, self.max_portable_size_bytes) {
            return Ok(TransferAndVerifyResult {
                verified: false,
                reason: Some(e.to_string()),
            });
        }

        self.last_verified
            .lock()
            .await
            .insert(params.migration_id.clone(), bytes);
        Ok(TransferAndVerifyResult {
            verified: true,
            reason: None,
        })
    }

    async fn rehydrate(&self, params: RehydrateParams) -> FlockResult<RehydrateResult> {
        let bytes = self
            .last_verified
            .lock()
            .await
            .remove(&params.migration_id)
            .ok_or_else(|| {
                FlockError::VerificationFailed(format!(
                    "rehydrate called for {} before a verified transfer",
                    params.migration_id
                ))
            })?;

        let target_dir = self.homes_root.join(&params.target_home_id);
        extract_archive(&bytes, &target_dir)?;

        Ok(RehydrateResult {
            rehydrated: true,
            warnings: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::build_archive;

    #[tokio::test]
    async fn full_cycle_writes_archive_into_target_home() {
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("memory.md"), b"hi").unwrap();
        let archive = build_archive(source.path()).unwrap();

        let homes_root = tempfile::tempdir().unwrap();
        let responder = LocalMigrationResponder::new(homes_root.path().to_path_buf());

        let accept = responder
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

        let verify = responder
            .transfer_and_verify(TransferAndVerifyParams {
                migration_id: "m1".into(),
                agent_id: "a1".into(),
                archive: flock_protocol::ArchivePayload {
                    archive_base64: base64::engine::general_purpose::STANDARD.encode(&archive.bytes),
                    digest_hex: archive.digest_hex.clone(),
                    size_bytes: archive.size_bytes(),
                },
            })
            .await
            .unwrap();
        assert!(verify.verified);

        let rehydrate = responder
            .rehydrate(RehydrateParams {
                migration_id: "m1".into(),
                agent_id: "a1".into(),
                target_home_id: "a1@n2".into(),
            })
            .await
            .unwrap();
        assert!(rehydrate.rehydrated);

        let restored = std::fs::read_to_string(homes_root.path().join("a1@n2").join("memory.md")).unwrap();
        assert_eq!(restored, "hi");
    }

    #[tokio::test]
    async fn tampered_digest_fails_verification_without_error() {
        let source = tempfile::tempdir().unwrap();
        let archive = build_archive(source.path()).unwrap();
        let homes_root = tempfile::tempdir().unwrap();
        let responder = LocalMigrationResponder::new(homes_root.path().to_path_buf());

        let verify = responder
            .transfer_and_verify(TransferAndVerifyParams {
                migration_id: "m1".into(),
                agent_id: "a1".into(),
                archive: flock_protocol::ArchivePayload {
                    archive_base64: base64::engine::general_purpose::STANDARD.encode(&archive.bytes),
                    digest_hex: "0000".to_string(),
                    size_bytes: archive.size_bytes(),
                },
            })
            .await
            .unwrap();
        assert!(!verify.verified);
        assert!(verify.reason.unwrap().contains("digest mismatch"));
    }
}
