//! Agent Card directory shape (spec §6: `GET /.well-known/agent-card.json`).
//!
//! The registry augments the public A2A card with a side table of private
//! metadata (role, node, home) — never embedded in the card JSON itself
//! (spec §6: "the registry never embeds private metadata in the card").

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentCardEntry {
    pub id: String,
    pub name: String,
    pub url: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<AgentSkill>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentCardDirectory {
    pub agents: Vec<AgentCardEntry>,
}

impl AgentCardDirectory {
    pub fn find(&self, agent_id: &str) -> Option<&AgentCardEntry> {
        self.agents.iter().find(|a| a.id == agent_id)
    }
}

/// Role values for the private side-table metadata (spec §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Sysadmin,
    Worker,
    System,
    Orchestrator,
}

/// Private per-agent metadata, kept out of the public card and used by
/// routing and the home machine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentCardMetadata {
    pub role: AgentRole,
    pub node_id: String,
    pub home_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_finds_entry_by_id() {
        let dir = AgentCardDirectory {
            agents: vec![AgentCardEntry {
                id: "workerA".into(),
                name: "Worker A".into(),
                url: "http://node-a/a2a/workerA".into(),
                version: "1.0".into(),
                capabilities: vec![],
                skills: vec![],
            }],
        };
        assert!(dir.find("workerA").is_some());
        assert!(dir.find("workerZ").is_none());
    }
}
