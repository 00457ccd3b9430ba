//! `FlockSettings`: the process-wide config a node is built from (spec §6/§9
//! "ambient stack" — a generalization of the teacher's `xdg_toml::Config`
//! from a single `[env]` passthrough table into Flock's own typed fields).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use flock_types::NodeId;

use crate::LoadError;

#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    pub base_tick: Duration,
    pub max_concurrent_ticks: usize,
    pub check_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            base_tick: Duration::from_secs(60),
            max_concurrent_ticks: 4,
            check_interval: Duration::from_secs(30),
        }
    }
}

/// Per-node settings assembled from the process environment (spec §9: node
/// id, data dir, bind addr, parent registry url, phase timeouts, scheduler
/// tuning, max portable size).
#[derive(Clone, Debug)]
pub struct FlockSettings {
    pub node_id: NodeId,
    pub data_dir: PathBuf,
    pub bind_addr: String,
    pub parent_registry_url: Option<String>,
    pub scheduler: SchedulerSettings,
    pub max_portable_size_bytes: u64,
    /// Echo tracker TTL (spec §9 open question 3): kept as a runtime setting
    /// rather than a hard-coded constant so an operator can tune it without
    /// a rebuild.
    pub echo_tracker_ttl: Duration,
}

impl Default for FlockSettings {
    fn default() -> Self {
        Self {
            node_id: NodeId::new("local").expect("literal is path-safe"),
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:7700".to_string(),
            parent_registry_url: None,
            scheduler: SchedulerSettings::default(),
            max_portable_size_bytes: 512 * 1024 * 1024,
            echo_tracker_ttl: Duration::from_secs(30),
        }
    }
}

impl FlockSettings {
    /// Builds settings from a key-value env map (the merged view
    /// `load_and_apply` produces), falling back to defaults for anything
    /// absent or unparsable.
    pub fn from_env_map(env: &HashMap<String, String>) -> Result<Self, LoadError> {
        let defaults = Self::default();

        let node_id = match env.get("FLOCK_NODE_ID") {
            Some(raw) => NodeId::new(raw.clone()).map_err(|e| LoadError::InvalidSetting(e.to_string()))?,
            None => defaults.node_id,
        };
        let data_dir = env
            .get("FLOCK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let bind_addr = env
            .get("FLOCK_BIND_ADDR")
            .cloned()
            .unwrap_or(defaults.bind_addr);
        let parent_registry_url = env.get("FLOCK_PARENT_REGISTRY_URL").cloned();

        let scheduler = SchedulerSettings {
            base_tick: parse_secs(env, "FLOCK_SCHEDULER_BASE_TICK_SECS", defaults.scheduler.base_tick)?,
            max_concurrent_ticks: parse_usize(
                env,
                "FLOCK_SCHEDULER_MAX_CONCURRENT_TICKS",
                defaults.scheduler.max_concurrent_ticks,
            )?,
            check_interval: parse_secs(
                env,
                "FLOCK_SCHEDULER_CHECK_INTERVAL_SECS",
                defaults.scheduler.check_interval,
            )?,
        };

        let max_portable_size_bytes = match env.get("FLOCK_MAX_PORTABLE_SIZE_BYTES") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| LoadError::InvalidSetting(format!("FLOCK_MAX_PORTABLE_SIZE_BYTES: {e}")))?,
            None => defaults.max_portable_size_bytes,
        };

        let echo_tracker_ttl = parse_secs(env, "FLOCK_ECHO_TRACKER_TTL_SECS", defaults.echo_tracker_ttl)?;

        Ok(Self {
            node_id,
            data_dir,
            bind_addr,
            parent_registry_url,
            scheduler,
            max_portable_size_bytes,
            echo_tracker_ttl,
        })
    }
}

fn parse_secs(env: &HashMap<String, String>, key: &str, default: Duration) -> Result<Duration, LoadError> {
    match env.get(key) {
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| LoadError::InvalidSetting(format!("{key}: {e}"))),
        None => Ok(default),
    }
}

fn parse_usize(env: &HashMap<String, String>, key: &str, default: usize) -> Result<usize, LoadError> {
    match env.get(key) {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|e| LoadError::InvalidSetting(format!("{key}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_env_yields_defaults() {
        let settings = FlockSettings::from_env_map(&HashMap::new()).unwrap();
        assert_eq!(settings.node_id.as_str(), "local");
        assert_eq!(settings.bind_addr, "127.0.0.1:7700");
        assert_eq!(settings.scheduler.max_concurrent_ticks, 4);
    }

    #[test]
    fn env_overrides_are_applied() {
        let mut env = HashMap::new();
        env.insert("FLOCK_NODE_ID".to_string(), "node-a".to_string());
        env.insert("FLOCK_BIND_ADDR".to_string(), "0.0.0.0:9000".to_string());
        env.insert("FLOCK_SCHEDULER_MAX_CONCURRENT_TICKS".to_string(), "16".to_string());
        let settings = FlockSettings::from_env_map(&env).unwrap();
        assert_eq!(settings.node_id.as_str(), "node-a");
        assert_eq!(settings.bind_addr, "0.0.0.0:9000");
        assert_eq!(settings.scheduler.max_concurrent_ticks, 16);
    }

    #[test]
    fn invalid_node_id_is_rejected() {
        let mut env = HashMap::new();
        env.insert("FLOCK_NODE_ID".to_string(), "not a path safe id!".to_string());
        let result = FlockSettings::from_env_map(&env);
        assert!(matches!(result, Err(LoadError::InvalidSetting(_))));
    }

    #[test]
    fn invalid_numeric_setting_is_rejected() {
        let mut env = HashMap::new();
        env.insert("FLOCK_MAX_PORTABLE_SIZE_BYTES".to_string(), "not-a-number".to_string());
        let result = FlockSettings::from_env_map(&env);
        assert!(matches!(result, Err(LoadError::InvalidSetting(_))));
    }
}
