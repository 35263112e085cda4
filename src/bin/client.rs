//! Training participant.
//!
//! Registers with the aggregation server, trains a logistic regression
//! model on a private synthetic dataset and submits a pairwise-masked
//! weight delta every round.
use quilt::participant::{self, ParticipantSettings};
use structopt::StructOpt;
use tracing_subscriber::{filter::EnvFilter, FmtSubscriber};

#[derive(Debug, StructOpt)]
#[structopt(name = "quilt-client", about = "Federated training participant.")]
struct Opt {
    /// Base URL of the aggregation server.
    #[structopt(long, default_value = "http://127.0.0.1:8000")]
    server: String,
    /// Unique identifier of this participant.
    #[structopt(long)]
    client_id: String,
    /// Number of samples in the synthetic local dataset.
    #[structopt(long, default_value = "300")]
    samples: usize,
    /// Number of rounds to contribute to.
    #[structopt(long, default_value = "10")]
    rounds: u64,
    /// Learning rate of the local training pass.
    #[structopt(long, default_value = "0.5")]
    lr: f64,
    /// Base seed for the synthetic dataset.
    #[structopt(long, default_value = "1234")]
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let opt = Opt::from_args();
    participant::run(ParticipantSettings {
        server: opt.server,
        client_id: opt.client_id,
        samples: opt.samples,
        rounds: opt.rounds,
        learning_rate: opt.lr,
        seed: opt.seed,
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
