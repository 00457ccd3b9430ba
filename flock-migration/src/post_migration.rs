//! Post-migration file helpers (spec §4.6): `POST_MIGRATION.md` is the
//! agent's own concern to interpret; this crate only offers exists/read/
//! clear primitives against the rehydrated home directory.

use std::path::Path;

use flock_types::{FlockError, FlockResult};

const POST_MIGRATION_FILENAME: &str = "POST_MIGRATION.md";

pub async fn exists(home_dir: &Path) -> bool {
    tokio::fs::metadata(home_dir.join(POST_MIGRATION_FILENAME))
        .await
        .is_ok()
}

pub async fn read(home_dir: &Path) -> FlockResult<Option<String>> {
    match tokio::fs::read_to_string(home_dir.join(POST_MIGRATION_FILENAME)).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FlockError::Storage(format!(
            "failed to read {POST_MIGRATION_FILENAME}: {e}"
        ))),
    }
}

pub async fn clear(home_dir: &Path) -> FlockResult<()> {
    match tokio::fs::remove_file(home_dir.join(POST_MIGRATION_FILENAME)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FlockError::Storage(format!(
            "failed to clear {POST_MIGRATION_FILENAME}: {e}"
        ))),
    }
}
