//! Round coordinator.
//!
//! Drives a federated training process to completion: waits for the
//! roster, configures every round, waits for the updates and finishes the
//! round on the aggregation server.
use quilt::coordinator::{self, CoordinatorSettings};
use structopt::StructOpt;
use tracing_subscriber::{filter::EnvFilter, FmtSubscriber};

#[derive(Debug, StructOpt)]
#[structopt(name = "quilt-coordinator", about = "Federated training coordinator.")]
struct Opt {
    /// Base URL of the aggregation server.
    #[structopt(long, default_value = "http://127.0.0.1:8000")]
    server: String,
    /// Number of training rounds to run.
    #[structopt(long, default_value = "30")]
    rounds: u64,
    /// Minimum number of registered clients required to start.
    #[structopt(long = "min-clients", default_value = "3")]
    min_clients: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let opt = Opt::from_args();
    coordinator::run(CoordinatorSettings {
        server: opt.server,
        rounds: opt.rounds,
        min_clients: opt.min_clients,
    })
    .await?;
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(true)
        .init();
}
