//! Default `Logger` capability implementation, forwarding to `tracing`
//! macros (spec §9 ambient stack: "a default `TracingLogger` implementation
//! in `flock-server`").

use flock_types::{LogLevel, Logger};

pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, target: &str, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "flock", source = target, "{message}"),
            LogLevel::Info => tracing::info!(target: "flock", source = target, "{message}"),
            LogLevel::Warn => tracing::warn!(target: "flock", source = target, "{message}"),
            LogLevel::Error => tracing::error!(target: "flock", source = target, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_every_level_without_panicking() {
        let logger = TracingLogger;
        logger.debug("test", "a debug message");
        logger.info("test", "an info message");
        logger.warn("test", "a warn message");
        logger.error("test", "an error message");
    }
}
