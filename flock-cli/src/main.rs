use clap::Parser;
use flock_cli::{run, Cli};

#[tokio::main]
async fn main() {
    flock_cli::logging::init();
    let cli = Cli::parse();
    let code = run(cli).await;
    std::process::exit(code);
}
