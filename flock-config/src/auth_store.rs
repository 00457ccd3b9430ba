//! Auth token store (spec §6 "Auth store"). Concrete OAuth/device-flow
//! wire-ups are out of scope (spec §1): this module only owns the on-disk
//! JSON contract and the lookup-order policy, taking a refresh capability as
//! a plain function value rather than reaching into a concrete provider SDK.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum AuthStoreError {
    #[error("read auth store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("write auth store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse auth store {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("serialize auth store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One provider's stored credential set.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    /// Unix epoch seconds; `None` means the credential never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
}

/// On-disk shape: `{version, credentials: {providerID -> Credential}}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    credentials: HashMap<String, Credential>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            credentials: HashMap::new(),
        }
    }
}

/// File-based credential store at a fixed path, mode 0600 with a 0700
/// parent directory.
pub struct AuthStore {
    path: PathBuf,
}

impl AuthStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<StoreFile, AuthStoreError> {
        if !self.path.exists() {
            return Ok(StoreFile::default());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| AuthStoreError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        let parsed: StoreFile = match serde_json::from_str(&raw) {
            Ok(v) => v,
            // A corrupt file is treated the same as an incompatible version:
            // start fresh rather than fail the caller.
            Err(_) => return Ok(StoreFile::default()),
        };
        if parsed.version != CURRENT_VERSION {
            return Ok(StoreFile::default());
        }
        Ok(parsed)
    }

    fn save(&self, store: &StoreFile) -> Result<(), AuthStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AuthStoreError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
            set_dir_mode(parent, 0o700).map_err(|e| AuthStoreError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(store)?;
        write_private(&self.path, json.as_bytes()).map_err(|e| AuthStoreError::Write {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }

    /// Reads the stored credential for `provider_id`, if any. A file on an
    /// incompatible version (or unparsable) is treated as empty.
    pub fn get(&self, provider_id: &str) -> Result<Option<Credential>, AuthStoreError> {
        Ok(self.load()?.credentials.get(provider_id).cloned())
    }

    pub fn set(&self, provider_id: &str, credential: Credential) -> Result<(), AuthStoreError> {
        let mut store = self.load()?;
        store.credentials.insert(provider_id.to_string(), credential);
        self.save(&store)
    }

    pub fn remove(&self, provider_id: &str) -> Result<(), AuthStoreError> {
        let mut store = self.load()?;
        store.credentials.remove(provider_id);
        self.save(&store)
    }

    /// Resolves an access token for `provider_id`:
    ///
    /// 1. If the store has a credential and it is not expired, return its
    ///    `access` token.
    /// 2. If it is expired and a `refresh` token is present, call
    ///    `refresh_fn(refresh_token)`; on success persist the new credential
    ///    and return its access token.
    /// 3. Otherwise fall back to `env_var` in the process environment.
    pub fn resolve(
        &self,
        provider_id: &str,
        env_var: &str,
        now_epoch_secs: i64,
        refresh_fn: impl FnOnce(&str) -> Option<Credential>,
    ) -> Result<Option<String>, AuthStoreError> {
        if let Some(cred) = self.get(provider_id)? {
            let expired = cred.expires.is_some_and(|exp| exp <= now_epoch_secs);
            if !expired {
                return Ok(Some(cred.access));
            }
            if let Some(refresh_token) = &cred.refresh {
                if let Some(refreshed) = refresh_fn(refresh_token) {
                    let access = refreshed.access.clone();
                    self.set(provider_id, refreshed)?;
                    return Ok(Some(access));
                }
            }
        }
        Ok(std::env::var(env_var).ok())
    }
}

#[cfg(unix)]
fn set_dir_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_dir_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthStore::new(dir.path().join("nested").join("auth.json"));
        assert_eq!(store.get("openai").unwrap(), None);
    }

    #[test]
    fn set_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthStore::new(dir.path().join("auth.json"));
        store
            .set(
                "openai",
                Credential {
                    access: "tok".into(),
                    refresh: Some("rtok".into()),
                    expires: Some(1_000),
                },
            )
            .unwrap();
        let got = store.get("openai").unwrap().unwrap();
        assert_eq!(got.access, "tok");
        assert_eq!(got.expires, Some(1_000));
    }

    #[test]
    fn incompatible_version_resets_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, r#"{"version": 99, "credentials": {"x": {"access": "y"}}}"#).unwrap();
        let store = AuthStore::new(path);
        assert_eq!(store.get("x").unwrap(), None);
    }

    #[test]
    fn resolve_returns_unexpired_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthStore::new(dir.path().join("auth.json"));
        store
            .set(
                "openai",
                Credential {
                    access: "tok".into(),
                    refresh: None,
                    expires: Some(2_000),
                },
            )
            .unwrap();
        let resolved = store
            .resolve("openai", "OPENAI_API_KEY", 1_000, |_| None)
            .unwrap();
        assert_eq!(resolved, Some("tok".to_string()));
    }

    #[test]
    fn resolve_refreshes_expired_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthStore::new(dir.path().join("auth.json"));
        store
            .set(
                "openai",
                Credential {
                    access: "old".into(),
                    refresh: Some("rtok".into()),
                    expires: Some(500),
                },
            )
            .unwrap();
        let resolved = store
            .resolve("openai", "OPENAI_API_KEY", 1_000, |refresh| {
                assert_eq!(refresh, "rtok");
                Some(Credential {
                    access: "new".into(),
                    refresh: Some("rtok2".into()),
                    expires: Some(5_000),
                })
            })
            .unwrap();
        assert_eq!(resolved, Some("new".to_string()));
        assert_eq!(store.get("openai").unwrap().unwrap().access, "new");
    }

    #[test]
    fn resolve_falls_back_to_env_when_store_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthStore::new(dir.path().join("auth.json"));
        std::env::set_var("FLOCK_TEST_AUTH_FALLBACK", "env-value");
        let resolved = store
            .resolve("openai", "FLOCK_TEST_AUTH_FALLBACK", 1_000, |_| None)
            .unwrap();
        std::env::remove_var("FLOCK_TEST_AUTH_FALLBACK");
        assert_eq!(resolved, Some("env-value".to_string()));
    }

    #[test]
    #[cfg(unix)]
    fn file_is_written_with_private_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let store = AuthStore::new(&path);
        store
            .set(
                "openai",
                Credential {
                    access: "tok".into(),
                    refresh: None,
                    expires: None,
                },
            )
            .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
