//! Adapts the opaque `SessionSend(agentID, text) -> text` capability to the
//! A2A `LocalExecutor` the routing client dispatches `Route::Local` calls
//! through (spec §1: session execution is out of scope as a concrete
//! implementation, so this is the thinnest possible bridge).

use std::sync::Arc;

use async_trait::async_trait;

use flock_protocol::{Message, Role, Task};
use flock_routing::LocalExecutor;
use flock_types::{AgentId, FlockResult, SessionSend};

pub struct SessionExecutor {
    session: Arc<dyn SessionSend>,
}

impl SessionExecutor {
    pub fn new(session: Arc<dyn SessionSend>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl LocalExecutor for SessionExecutor {
    async fn send_local(&self, agent_id: &AgentId, message: Message) -> FlockResult<Task> {
        let reply_text = self.session.send(agent_id.as_str(), &message.text_content()).await?;
        Ok(Task::completed(
            uuid::Uuid::new_v4().to_string(),
            Message::text(Role::Agent, uuid::Uuid::new_v4().to_string(), reply_text),
            Vec::new(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    #[async_trait]
    impl SessionSend for Echo {
        async fn send(&self, _agent_id: &str, text: &str) -> FlockResult<String> {
            Ok(format!("echo: {text}"))
        }
    }

    #[tokio::test]
    async fn wraps_session_reply_as_a_completed_task() {
        let executor = SessionExecutor::new(Arc::new(Echo));
        let task = executor
            .send_local(
                &AgentId::new("a1").unwrap(),
                Message::text(Role::User, "m1", "hi"),
            )
            .await
            .unwrap();
        assert_eq!(task.status.message.unwrap().text_content(), "echo: hi");
    }
}
