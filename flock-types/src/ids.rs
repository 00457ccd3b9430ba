//! Validated id newtypes.
//!
//! Every id that can end up as a filesystem path component is validated at
//! construction against `[A-Za-z0-9_-]+` (spec invariant: ids never reach
//! the filesystem unsanitized). `HomeId` additionally enforces the
//! `agentID@nodeID` shape.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FlockError;

fn is_path_safe(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

macro_rules! path_safe_id {
    ($name:ident, $label:literal) => {
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Result<Self, FlockError> {
                let raw = raw.into();
                if !is_path_safe(&raw) {
                    return Err(FlockError::InvalidId {
                        kind: $label,
                        value: raw,
                    });
                }
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = FlockError;
            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::new(raw)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = FlockError;
            fn try_from(raw: &str) -> Result<Self, Self::Error> {
                Self::new(raw)
            }
        }
    };
}

path_safe_id!(AgentId, "AgentId");
path_safe_id!(NodeId, "NodeId");
path_safe_id!(ChannelId, "ChannelId");
path_safe_id!(MigrationId, "MigrationId");
path_safe_id!(BridgeId, "BridgeId");

/// `agentID@nodeID`. Both halves are independently path-safe; the `@` is the
/// only non-path-safe character allowed, and only as the single separator.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HomeId(String);

impl HomeId {
    pub fn new(agent_id: &AgentId, node_id: &NodeId) -> Self {
        Self(format!("{}@{}", agent_id.as_str(), node_id.as_str()))
    }

    pub fn parse(raw: impl Into<String>) -> Result<Self, FlockError> {
        let raw = raw.into();
        let mut parts = raw.splitn(2, '@');
        let (agent, node) = match (parts.next(), parts.next()) {
            (Some(a), Some(n)) if !n.contains('@') => (a, n),
            _ => {
                return Err(FlockError::InvalidId {
                    kind: "HomeId",
                    value: raw,
                })
            }
        };
        if !is_path_safe(agent) || !is_path_safe(node) {
            return Err(FlockError::InvalidId {
                kind: "HomeId",
                value: raw,
            });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn agent_id(&self) -> AgentId {
        let (agent, _) = self.0.split_once('@').expect("validated at construction");
        AgentId::new(agent).expect("validated at construction")
    }

    pub fn node_id(&self) -> NodeId {
        let (_, node) = self.0.split_once('@').expect("validated at construction");
        NodeId::new(node).expect("validated at construction")
    }
}

impl fmt::Display for HomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsafe_chars() {
        assert!(AgentId::new("ok-id_1").is_ok());
        assert!(AgentId::new("bad/id").is_err());
        assert!(AgentId::new("bad id").is_err());
        assert!(AgentId::new("").is_err());
    }

    #[test]
    fn home_id_roundtrips() {
        let a = AgentId::new("a1").unwrap();
        let n = NodeId::new("n1").unwrap();
        let h = HomeId::new(&a, &n);
        assert_eq!(h.as_str(), "a1@n1");
        let parsed = HomeId::parse("a1@n1").unwrap();
        assert_eq!(parsed.agent_id(), a);
        assert_eq!(parsed.node_id(), n);
    }

    #[test]
    fn home_id_rejects_malformed() {
        assert!(HomeId::parse("no-at-sign").is_err());
        assert!(HomeId::parse("a@b@c").is_err());
        assert!(HomeId::parse("@b").is_err());
        assert!(HomeId::parse("a@").is_err());
    }
}
