//! `SessionSend` stub: LLM session execution is explicitly out of scope as a
//! concrete implementation (spec §1), so a standalone `flock serve` needs a
//! placeholder that fails loudly rather than silently doing nothing. A real
//! deployment supplies its own `SessionSend` impl wired in place of this one.

use async_trait::async_trait;

use flock_types::{FlockError, FlockResult, SessionSend};

pub struct UnimplementedSessionSend;

#[async_trait]
impl SessionSend for UnimplementedSessionSend {
    async fn send(&self, agent_id: &str, _text: &str) -> FlockResult<String> {
        Err(FlockError::Internal(format!(
            "no SessionSend backend configured for agent {agent_id}; flock-cli wires a stub, a real deployment must supply its own"
        )))
    }
}
