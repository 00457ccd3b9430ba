//! Load configuration from XDG `config.toml` and project `.env`, then build
//! `FlockSettings` with priority: **existing env > .env > XDG**.

mod auth_store;
mod dotenv;
mod settings;
mod xdg;

pub use auth_store::{AuthStore, AuthStoreError, Credential};

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

pub use settings::{FlockSettings, SchedulerSettings};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read xdg config: {0}")]
    XdgRead(std::io::Error),
    #[error("parse xdg toml: {0}")]
    XdgParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

/// Loads config from XDG `config.toml` and optional project `.env`, merges
/// with the process environment (existing env wins), and builds
/// `FlockSettings` from the result.
///
/// * `app_name`: e.g. `"flock"` — used for the XDG path `~/.config/<app_name>/config.toml`.
/// * `override_dir`: if `Some`, look for `.env` in this directory instead of `std::env::current_dir()`.
pub fn load_settings(app_name: &str, override_dir: Option<&Path>) -> Result<FlockSettings, LoadError> {
    let xdg_map = xdg::load_env_map(app_name)?;
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;

    let mut keys: HashSet<String> = xdg_map.keys().cloned().collect();
    keys.extend(dotenv_map.keys().cloned());

    let mut merged = std::collections::HashMap::new();
    for key in keys {
        let value = std::env::var(&key).ok().or_else(|| {
            dotenv_map
                .get(&key)
                .or_else(|| xdg_map.get(&key))
                .cloned()
        });
        if let Some(v) = value {
            merged.insert(key, v);
        }
    }
    // Settings read directly from the process environment even when no
    // XDG/.env source mentions the key (e.g. FLOCK_NODE_ID exported by the
    // caller's shell with no config file present at all).
    for key in FlockSettings::env_keys() {
        if let Ok(v) = std::env::var(key) {
            merged.insert(key.to_string(), v);
        }
    }

    FlockSettings::from_env_map(&merged)
}

impl FlockSettings {
    fn env_keys() -> &'static [&'static str] {
        &[
            "FLOCK_NODE_ID",
            "FLOCK_DATA_DIR",
            "FLOCK_BIND_ADDR",
            "FLOCK_PARENT_REGISTRY_URL",
            "FLOCK_SCHEDULER_BASE_TICK_SECS",
            "FLOCK_SCHEDULER_MAX_CONCURRENT_TICKS",
            "FLOCK_SCHEDULER_CHECK_INTERVAL_SECS",
            "FLOCK_MAX_PORTABLE_SIZE_BYTES",
            "FLOCK_ECHO_TRACKER_TTL_SECS",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn load_settings_with_no_sources_returns_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings("flock-config-test-nonexistent-app", Some(dir.path())).unwrap();
        assert_eq!(settings.bind_addr, "127.0.0.1:7700");
    }

    #[test]
    fn dotenv_overrides_xdg() {
        let _guard = ENV_LOCK.lock().unwrap();
        let xdg_dir = tempfile::tempdir().unwrap();
        let app_dir = xdg_dir.path().join("flock");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(
            app_dir.join("config.toml"),
            "[env]\nFLOCK_BIND_ADDR = \"10.0.0.1:1\"\n",
        )
        .unwrap();

        let dotenv_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dotenv_dir.path().join(".env"),
            "FLOCK_BIND_ADDR=0.0.0.0:9000\n",
        )
        .unwrap();

        let prev_xdg = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg_dir.path());
        env::remove_var("FLOCK_BIND_ADDR");

        let settings = load_settings("flock", Some(dotenv_dir.path())).unwrap();
        match prev_xdg {
            Some(p) => env::set_var("XDG_CONFIG_HOME", p),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }

        assert_eq!(settings.bind_addr, "0.0.0.0:9000");
    }

    #[test]
    fn existing_process_env_wins_over_dotenv() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dotenv_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dotenv_dir.path().join(".env"),
            "FLOCK_BIND_ADDR=0.0.0.0:9000\n",
        )
        .unwrap();

        env::set_var("FLOCK_BIND_ADDR", "127.0.0.1:1234");
        let settings = load_settings("flock-config-test-nonexistent-app", Some(dotenv_dir.path())).unwrap();
        env::remove_var("FLOCK_BIND_ADDR");

        assert_eq!(settings.bind_addr, "127.0.0.1:1234");
    }
}
