//! Audit severity levels shared across the home machine, channels, scheduler
//! and migration engine (spec §3: AuditEntry.level).

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditLevel {
    Green,
    Yellow,
    Red,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Green => "GREEN",
            AuditLevel::Yellow => "YELLOW",
            AuditLevel::Red => "RED",
        }
    }
}
