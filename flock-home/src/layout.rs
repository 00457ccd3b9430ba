//! Home directory provisioning (spec §6 "Home filesystem layout"): the fixed
//! directory tree, permission modes, and bind-mount descriptor ordering used
//! when a home moves UNASSIGNED -> PROVISIONING. Container provisioning
//! itself is out of scope (spec §1 non-goal); this module only produces the
//! directory layout and the descriptor list a provisioner binds in.

use std::path::{Path, PathBuf};

use flock_types::{FlockError, FlockResult};

/// Subdirectories created under a home's root, in creation order.
pub const SUBDIRECTORIES: &[&str] = &[
    "agent", "work", "run", "log", "audit", "secrets", "workspace", "node",
];

/// Read-only files bind-mounted into the home from a shared, immutable
/// source; never written by the agent.
pub const IMMUTABLE_FILES: &[&str] = &["AGENTS.md", "USER.md"];

/// Mutable seed files created writable inside the home on first
/// provisioning, left alone on subsequent provisioning if already present.
pub const SEED_FILES: &[&str] = &[
    "SOUL.md",
    "IDENTITY.md",
    "MEMORY.md",
    "HEARTBEAT.md",
    "TOOLS.md",
];

#[cfg(unix)]
const DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const SECRETS_MODE: u32 = 0o700;
#[cfg(unix)]
const SECRETS_FILE_MODE: u32 = 0o600;

/// A single bind-mount the provisioner is expected to honor, in the order
/// the external contract requires: the workspace directory first, then the
/// immutable files in the order listed above.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindMount {
    /// Path relative to the home root that receives the mount.
    pub target: PathBuf,
    /// Whether the mount must be read-only.
    pub read_only: bool,
}

/// The directory tree and bind-mount plan for one home.
#[derive(Clone, Debug)]
pub struct HomeLayout {
    pub root: PathBuf,
}

impl HomeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn subdirectory(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Creates the fixed directory tree under `self.root` (idempotent — safe
    /// to call again on an already-provisioned home) and writes any seed
    /// files that are not already present. Directories are created mode
    /// 0700; `secrets/` and its contents additionally get 0600 on files.
    /// Returns the bind-mount descriptors the caller's provisioner must
    /// honor, workspace-directory-first then the immutable files in listed
    /// order.
    pub fn provision(&self) -> FlockResult<Vec<BindMount>> {
        create_dir(&self.root)?;
        for name in SUBDIRECTORIES {
            create_dir(&self.root.join(name))?;
        }
        #[cfg(unix)]
        {
            set_mode(&self.root.join("secrets"), SECRETS_MODE)?;
        }
        for name in SEED_FILES {
            let path = self.root.join("agent").join(name);
            if !path.exists() {
                std::fs::write(&path, "").map_err(|e| {
                    FlockError::Storage(format!("failed to seed {}: {e}", path.display()))
                })?;
            }
        }
        Ok(self.bind_mounts())
    }

    /// Bind-mount descriptors in external-contract order: the workspace
    /// directory first, then the immutable files.
    pub fn bind_mounts(&self) -> Vec<BindMount> {
        let mut mounts = vec![BindMount {
            target: self.root.join("workspace"),
            read_only: false,
        }];
        for name in IMMUTABLE_FILES {
            mounts.push(BindMount {
                target: self.root.join("agent").join(name),
                read_only: true,
            });
        }
        mounts
    }

    /// Path to a secret file under `secrets/`; the file itself is created
    /// with mode 0600 by `write_secret`.
    pub fn secret_path(&self, name: &str) -> PathBuf {
        self.root.join("secrets").join(name)
    }

    pub fn write_secret(&self, name: &str, contents: &[u8]) -> FlockResult<()> {
        let path = self.secret_path(name);
        std::fs::write(&path, contents)
            .map_err(|e| FlockError::Storage(format!("failed to write secret {}: {e}", path.display())))?;
        #[cfg(unix)]
        {
            set_mode(&path, SECRETS_FILE_MODE)?;
        }
        Ok(())
    }
}

fn create_dir(path: &Path) -> FlockResult<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| FlockError::Storage(format!("failed to create {}: {e}", path.display())))?;
    #[cfg(unix)]
    {
        set_mode(path, DIR_MODE)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> FlockResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| FlockError::Storage(format!("failed to chmod {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_creates_fixed_tree() {
        let dir = tempfile::tempdir().unwrap();
        let layout = HomeLayout::new(dir.path().join("a1@n1"));
        layout.provision().unwrap();
        for name in SUBDIRECTORIES {
            assert!(layout.subdirectory(name).is_dir(), "missing {name}");
        }
        for name in SEED_FILES {
            assert!(layout.root.join("agent").join(name).is_file(), "missing seed {name}");
        }
    }

    #[test]
    fn provision_is_idempotent_and_preserves_seed_contents() {
        let dir = tempfile::tempdir().unwrap();
        let layout = HomeLayout::new(dir.path().join("a1@n1"));
        layout.provision().unwrap();
        let memory_path = layout.root.join("agent").join("MEMORY.md");
        std::fs::write(&memory_path, "hello").unwrap();
        layout.provision().unwrap();
        assert_eq!(std::fs::read_to_string(&memory_path).unwrap(), "hello");
    }

    #[test]
    fn bind_mounts_sort_workspace_first_then_immutable_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let layout = HomeLayout::new(dir.path().join("a1@n1"));
        let mounts = layout.bind_mounts();
        assert_eq!(mounts[0].target, layout.root.join("workspace"));
        assert!(!mounts[0].read_only);
        assert_eq!(mounts[1].target, layout.root.join("agent").join("AGENTS.md"));
        assert_eq!(mounts[2].target, layout.root.join("agent").join("USER.md"));
        assert!(mounts[1].read_only && mounts[2].read_only);
    }

    #[test]
    #[cfg(unix)]
    fn secrets_directory_and_files_are_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let layout = HomeLayout::new(dir.path().join("a1@n1"));
        layout.provision().unwrap();
        layout.write_secret("token", b"shh").unwrap();
        let dir_mode = std::fs::metadata(layout.root.join("secrets")).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
        let file_mode = std::fs::metadata(layout.secret_path("token")).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
    }
}
