//! Aggregation server.
//!
//! This binary serves as entry point for the server implementation and
//! executes it. Every instance coordinates one federated training process
//! and holds its round state in memory.
use std::{path::PathBuf, process};

use quilt::{
    engine::{EngineHandle, RoundEngine},
    rest,
    settings::{LogSettings, Settings},
};
use structopt::StructOpt;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, StructOpt)]
#[structopt(name = "quilt-server", about = "Secure aggregation server.")]
struct Opt {
    /// Path to a TOML settings file; defaults are used without one.
    #[structopt(short, parse(from_os_str))]
    config_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();
    let settings = Settings::new(opt.config_path).unwrap_or_else(|error| {
        eprintln!("{}", error);
        process::exit(1);
    });
    let Settings {
        api: api_settings,
        model: model_settings,
        log: logging,
    } = settings;
    init_logging(logging);

    let engine = EngineHandle::new(RoundEngine::new(model_settings.feature_weight));
    info!(
        "serving the aggregation API on {} (feature_weight {})",
        api_settings.bind_address, model_settings.feature_weight
    );

    tokio::select! {
        biased;

        _ = signal::ctrl_c() => {
            warn!("shutting down on interrupt");
        }
        _ = rest::serve(api_settings.bind_address, engine) => {
            warn!("shutting down: rest http server terminated");
        }
    }
}

fn init_logging(settings: LogSettings) {
    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(settings.filter)
        .with_ansi(true)
        .init();
}
