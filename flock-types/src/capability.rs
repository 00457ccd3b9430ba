//! Capability interfaces for dependencies that would otherwise be reached
//! via global state (spec §9): logging, LLM session execution, external
//! platform sends. Each is a small async trait object passed in at
//! construction, never a global.

use async_trait::async_trait;

use crate::error::FlockResult;

/// Log levels a capability-style logger supports. Mirrors the teacher's use
/// of `tracing` macros, but kept as an explicit trait so RED audit entries
/// can call `warn` without every domain crate depending on a global
/// subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, target: &str, message: &str);

    fn debug(&self, target: &str, message: &str) {
        self.log(LogLevel::Debug, target, message);
    }
    fn info(&self, target: &str, message: &str) {
        self.log(LogLevel::Info, target, message);
    }
    fn warn(&self, target: &str, message: &str) {
        self.log(LogLevel::Warn, target, message);
    }
    fn error(&self, target: &str, message: &str) {
        self.log(LogLevel::Error, target, message);
    }
}

/// A logger that discards everything. Useful as a test default.
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: LogLevel, _target: &str, _message: &str) {}
}

/// LLM session execution, treated as an opaque `SessionSend(agentID, text)
/// -> text` capability (spec §1: out of scope as a concrete implementation).
#[async_trait]
pub trait SessionSend: Send + Sync {
    async fn send(&self, agent_id: &str, text: &str) -> FlockResult<String>;
}

/// Delivery options for an outbound external-platform send.
#[derive(Clone, Debug, Default)]
pub struct ExternalSendOptions {
    pub display_name: Option<String>,
    pub webhook_url: Option<String>,
    pub account_id: Option<String>,
}

/// Abstract sink for relaying a channel message onto an external chat
/// platform (spec §4.4 outbound path). Concrete platform SDKs are out of
/// scope; this is the seam a platform adapter would implement.
#[async_trait]
pub trait SendExternal: Send + Sync {
    async fn send_external(
        &self,
        platform: &str,
        external_channel_id: &str,
        message: &str,
        options: ExternalSendOptions,
    ) -> FlockResult<()>;
}

/// A source of "now", so tests can control time deterministically.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}
