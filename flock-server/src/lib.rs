pub mod a2a;
pub mod app;
pub mod error;
pub mod executor;
pub mod logging;
pub mod migration_rpc;
pub mod state;

pub use a2a::{a2a_endpoint, agent_card, proxy_send};
pub use app::{router, run_serve, run_serve_on_listener};
pub use error::ApiError;
pub use executor::SessionExecutor;
pub use logging::TracingLogger;
pub use migration_rpc::migration_rpc;
pub use state::AppState;
