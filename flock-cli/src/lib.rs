//! `flock` CLI: `serve` runs a node's HTTP surface, `home`/`migrate` drive
//! the home machine and migration engine directly against a node's SQLite
//! store (spec §6 "CLI/exit codes"; ambient entry-point wiring, spec §1
//! non-goal "CLI entry points" — business logic only, no bespoke argument
//! parser).

pub mod exit_code;
pub mod logging;
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use flock_home::HomeService;
use flock_migration::{FrozenGuard, HttpMigrationTransport, MigrationService};
use flock_store::{
    HomeFilter, HomeState, MigrationEndpoint, MigrationTicketFilter, SqliteStores, Stores,
};
use flock_types::{AgentId, FlockError, FlockResult, HomeId, MigrationId, NodeId, NullLogger, SystemClock};

pub use exit_code::{exit_code_for, CommandKind};

#[derive(Parser, Debug)]
#[command(name = "flock", about = "Multi-node orchestration substrate for a fleet of LLM agents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs this node's A2A + migration HTTP surface.
    Serve(ServeArgs),
    /// Inspects or transitions home records.
    Home(HomeArgs),
    /// Drives a migration against a target node.
    Migrate(MigrateArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    #[arg(long, env = "FLOCK_BIND_ADDR")]
    pub bind: Option<String>,
    #[arg(long, env = "FLOCK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
    #[arg(long, env = "FLOCK_NODE_ID")]
    pub node_id: Option<String>,
    #[arg(long, env = "FLOCK_PARENT_REGISTRY_URL")]
    pub parent_registry: Option<String>,
}

#[derive(Args, Debug)]
pub struct HomeArgs {
    #[command(subcommand)]
    pub command: HomeCommand,
    #[arg(long, global = true, env = "FLOCK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum HomeCommand {
    Create {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        node: String,
    },
    Transition {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        node: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        reason: String,
        #[arg(long = "by", default_value = "operator")]
        triggered_by: String,
    },
    List {
        #[arg(long)]
        state: Option<String>,
    },
    CheckLeases,
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub command: MigrateCommand,
    #[arg(long, global = true, env = "FLOCK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum MigrateCommand {
    Request {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        source_node: String,
        #[arg(long)]
        source_endpoint: String,
        #[arg(long)]
        target_node: String,
        #[arg(long)]
        target_endpoint: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        portable_path: PathBuf,
    },
    Status {
        #[arg(long)]
        id: String,
    },
}

fn parse_home_state(raw: &str) -> FlockResult<HomeState> {
    match raw.to_ascii_uppercase().as_str() {
        "UNASSIGNED" => Ok(HomeState::Unassigned),
        "PROVISIONING" => Ok(HomeState::Provisioning),
        "IDLE" => Ok(HomeState::Idle),
        "LEASED" => Ok(HomeState::Leased),
        "ACTIVE" => Ok(HomeState::Active),
        "FROZEN" => Ok(HomeState::Frozen),
        "MIGRATING" => Ok(HomeState::Migrating),
        "ERROR" => Ok(HomeState::Error),
        "RETIRED" => Ok(HomeState::Retired),
        other => Err(FlockError::InvalidInput(format!("unknown home state {other:?}"))),
    }
}

fn open_stores(data_dir: &Option<PathBuf>) -> FlockResult<Arc<dyn Stores>> {
    let dir = data_dir.clone().unwrap_or_else(|| PathBuf::from("./data"));
    std::fs::create_dir_all(&dir)
        .map_err(|e| FlockError::Storage(format!("failed to create data dir {}: {e}", dir.display())))?;
    let stores = SqliteStores::new(dir.join("flock.db"))?;
    stores.migrate()?;
    Ok(Arc::new(stores))
}

async fn run_home(args: HomeArgs) -> FlockResult<()> {
    let stores = open_stores(&args.data_dir)?;
    let homes = HomeService::new(stores, Arc::new(SystemClock));
    match args.command {
        HomeCommand::Create { agent, node } => {
            let agent_id = AgentId::new(agent)?;
            let node_id = NodeId::new(node)?;
            let home = homes.create(&agent_id, &node_id).await?;
            println!("created {} in state {}", home.home_id, home.state);
        }
        HomeCommand::Transition {
            agent,
            node,
            to,
            reason,
            triggered_by,
        } => {
            let agent_id = AgentId::new(agent)?;
            let node_id = NodeId::new(node)?;
            let home_id = HomeId::new(&agent_id, &node_id);
            let to_state = parse_home_state(&to)?;
            let home = homes.transition(&home_id, to_state, &reason, &triggered_by).await?;
            println!("{} -> {}", home.home_id, home.state);
        }
        HomeCommand::List { state } => {
            let filter = HomeFilter {
                state: state.map(|s| parse_home_state(&s)).transpose()?,
                ..Default::default()
            };
            for home in homes.list(filter).await? {
                println!("{}\t{}\tupdated={}", home.home_id, home.state, home.updated_at);
            }
        }
        HomeCommand::CheckLeases => {
            let expired = homes.check_lease_expiry().await?;
            println!("{} lease(s) expired", expired.len());
            for t in expired {
                println!("{} -> {} ({})", t.home_id, t.to_state, t.reason);
            }
        }
    }
    Ok(())
}

async fn run_migrate(args: MigrateArgs) -> FlockResult<()> {
    let stores = open_stores(&args.data_dir)?;
    match args.command {
        MigrateCommand::Request {
            agent,
            source_node,
            source_endpoint,
            target_node,
            target_endpoint,
            reason,
            portable_path,
        } => {
            let agent_id = AgentId::new(agent)?;
            let source_node_id = NodeId::new(source_node)?;
            let source = MigrationEndpoint {
                home_id: HomeId::new(&agent_id, &source_node_id),
                node_id: source_node_id,
                endpoint: source_endpoint,
            };
            let target_node_id = NodeId::new(target_node)?;
            let target = MigrationEndpoint {
                home_id: HomeId::new(&agent_id, &target_node_id),
                node_id: target_node_id,
                endpoint: target_endpoint.clone(),
            };

            let homes = Arc::new(HomeService::new(stores.clone(), Arc::new(SystemClock)));
            let transport = Arc::new(HttpMigrationTransport::new(&target_endpoint));
            let service = MigrationService::new(
                stores,
                homes,
                Arc::new(SystemClock),
                Arc::new(NullLogger),
                transport,
            );
            let ticket = service
                .run(&agent_id, source, target, &reason, &portable_path)
                .await?;
            println!("migration {} reached {}", ticket.migration_id, ticket.phase);
        }
        MigrateCommand::Status { id } => {
            let migration_id = MigrationId::new(id)?;
            let tickets = stores
                .migration_tickets()
                .list(MigrationTicketFilter::default())
                .await?;
            let ticket = tickets
                .into_iter()
                .find(|t| t.migration_id == migration_id)
                .ok_or_else(|| FlockError::TicketNotFound(migration_id.as_str().to_string()))?;
            println!("{}\t{}\tupdated={}", ticket.migration_id, ticket.phase, ticket.updated_at);
            if let Some(error) = &ticket.error {
                println!("error: {error}");
            }
            let guard = FrozenGuard::new(stores.clone());
            match guard.check(&ticket.agent_id).await {
                Ok(()) => println!("frozen guard: not rejected"),
                Err(e) => println!("frozen guard: {e}"),
            }
        }
    }
    Ok(())
}

async fn run_serve(args: ServeArgs) -> FlockResult<()> {
    let settings = flock_config::load_settings("flock", None)
        .map_err(|e| FlockError::InvalidInput(e.to_string()))?;
    let node_id = match args.node_id {
        Some(raw) => NodeId::new(raw)?,
        None => settings.node_id,
    };
    let data_dir = args.data_dir.unwrap_or(settings.data_dir);
    let bind_addr = args.bind.unwrap_or(settings.bind_addr);
    let parent_registry = args.parent_registry.or(settings.parent_registry_url);

    std::fs::create_dir_all(&data_dir)
        .map_err(|e| FlockError::Storage(format!("failed to create data dir {}: {e}", data_dir.display())))?;
    let sqlite = SqliteStores::new(data_dir.join("flock.db"))?;
    sqlite.migrate()?;
    let stores: Arc<dyn Stores> = Arc::new(sqlite);

    let logger: Arc<dyn flock_types::Logger> = Arc::new(flock_server::TracingLogger);
    let session: Arc<dyn flock_types::SessionSend> = Arc::new(session::UnimplementedSessionSend);
    let executor = Arc::new(flock_server::executor::SessionExecutor::new(session.clone()));

    let registry = Arc::new(flock_routing::NodeRegistry::new());
    let parent = parent_registry.map(flock_routing::ParentRegistryClient::new);
    let empty_table: Arc<dyn flock_routing::LocalAgentTable> = Arc::new(EmptyLocalTable);
    let resolver = Arc::new(flock_routing::PeerResolver::new(empty_table, registry, parent));
    let routing = Arc::new(flock_routing::RoutingClient::new(resolver, executor));

    let scheduler_config = flock_scheduler::SchedulerConfig {
        base_tick: settings.scheduler.base_tick,
        max_concurrent_ticks: settings.scheduler.max_concurrent_ticks,
        check_interval: settings.scheduler.check_interval,
    };
    let coordinator = flock_scheduler::Coordinator::new(
        stores.clone(),
        Arc::new(SystemClock),
        logger.clone(),
        session.clone(),
        scheduler_config,
    );
    let _scheduler_handle = flock_scheduler::spawn(coordinator, settings.scheduler.check_interval);

    let responder = Arc::new(flock_migration::LocalMigrationResponder::new(data_dir.join("homes")));
    let state = Arc::new(flock_server::AppState::new(
        stores,
        routing,
        flock_protocol::AgentCardDirectory {
            agents: vec![flock_protocol::AgentCardEntry {
                id: node_id.as_str().to_string(),
                name: node_id.as_str().to_string(),
                url: format!("http://{bind_addr}"),
                version: env!("CARGO_PKG_VERSION").to_string(),
                capabilities: Vec::new(),
                skills: Vec::new(),
            }],
        },
        responder,
    ));

    tracing::info!(node_id = %node_id, bind_addr = %bind_addr, "starting flock node");
    logger.info("flock_cli::serve", &format!("node {node_id} starting on {bind_addr}"));
    flock_server::run_serve(Some(&bind_addr), state)
        .await
        .map_err(|e| FlockError::Internal(e.to_string()))
}

struct EmptyLocalTable;
impl flock_routing::LocalAgentTable for EmptyLocalTable {
    fn contains(&self, _agent_id: &AgentId) -> bool {
        false
    }
}

/// Runs the parsed CLI and returns the process exit code (spec §6).
pub async fn run(cli: Cli) -> i32 {
    let (kind, result) = match cli.command {
        Command::Serve(args) => (CommandKind::Serve, run_serve(args).await),
        Command::Home(args) => (CommandKind::Home, run_home(args).await),
        Command::Migrate(args) => (CommandKind::Migrate, run_migrate(args).await),
    };
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            exit_code_for(kind, &e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_home_state() {
        for raw in ["UNASSIGNED", "idle", "Leased", "ACTIVE", "frozen", "migrating", "error", "retired"] {
            assert!(parse_home_state(raw).is_ok(), "{raw} should parse");
        }
        assert!(parse_home_state("NOT_A_STATE").is_err());
    }

    #[tokio::test]
    async fn home_create_then_list_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        run_home(HomeArgs {
            data_dir: Some(dir.path().to_path_buf()),
            command: HomeCommand::Create {
                agent: "a1".into(),
                node: "n1".into(),
            },
        })
        .await
        .unwrap();

        run_home(HomeArgs {
            data_dir: Some(dir.path().to_path_buf()),
            command: HomeCommand::List { state: None },
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn home_transition_rejects_invalid_state_as_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        run_home(HomeArgs {
            data_dir: Some(dir.path().to_path_buf()),
            command: HomeCommand::Create {
                agent: "a1".into(),
                node: "n1".into(),
            },
        })
        .await
        .unwrap();

        let err = run_home(HomeArgs {
            data_dir: Some(dir.path().to_path_buf()),
            command: HomeCommand::Transition {
                agent: "a1".into(),
                node: "n1".into(),
                to: "ACTIVE".into(),
                reason: "skip ahead".into(),
                triggered_by: "operator".into(),
            },
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), flock_types::ErrorKind::Validation);
    }
}
