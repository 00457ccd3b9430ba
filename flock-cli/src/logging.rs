//! `tracing-subscriber` init (spec §9 ambient stack: "the teacher's `cli`
//! configures `tracing-subscriber`"). `RUST_LOG` controls verbosity;
//! defaults to `info` when unset.

pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
