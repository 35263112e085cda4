//! Round-driving coordinator.
//!
//! Waits for enough clients to register, freezes the roster, then runs the
//! configured number of rounds: configure the participant set, poll until
//! every expected update arrived (or the per-round timeout fires), finish
//! the round. A timed-out round is finished anyway and its `incomplete`
//! rejection is surfaced as a round failure.
use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::service::{Api, ServiceError};

/// Wall-clock budget for collecting one round.
const ROUND_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const ROSTER_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
/// Runtime options of the coordinator.
pub struct CoordinatorSettings {
    pub server: String,
    pub rounds: u64,
    pub min_clients: usize,
}

/// Drives `rounds` training rounds to completion and prints a summary.
pub async fn run(settings: CoordinatorSettings) -> Result<(), ServiceError> {
    let api = Api::new(&settings.server);
    let training_start = Instant::now();

    // freeze the roster once enough clients registered
    let roster = loop {
        match api.roster().await {
            Ok(reply) if reply.clients.len() >= settings.min_clients => break reply.clients,
            Ok(reply) => {
                info!(
                    "waiting for clients: {}/{} registered",
                    reply.clients.len(),
                    settings.min_clients
                );
            }
            Err(err) => warn!("fetching the roster failed: {}, retrying", err),
        }
        sleep(ROSTER_INTERVAL).await;
    };
    info!("roster frozen: {:?}", roster);

    let mut round_times = Vec::with_capacity(settings.rounds as usize);
    let mut failures = 0u64;
    for round in 0..settings.rounds {
        let round_start = Instant::now();

        let configured = api.configure_round(&roster).await?;
        info!(
            "[round {}] configured {} participants",
            round,
            configured.participants.len()
        );

        // collect until complete or the round budget is spent
        let collect_start = Instant::now();
        loop {
            let status = match api.status().await {
                Ok(status) => status,
                Err(err) => {
                    warn!("[round {}] status fetch failed: {}, retrying", round, err);
                    sleep(POLL_INTERVAL).await;
                    continue;
                }
            };
            let received: HashSet<&String> = status.received.iter().collect();
            let expected: HashSet<&String> = status.expected.iter().collect();
            debug!(
                "[round {}] received {}/{} updates",
                round,
                received.len(),
                expected.len()
            );
            if received == expected {
                info!(
                    "[round {}] all {} updates received",
                    round,
                    received.len()
                );
                break;
            }
            if collect_start.elapsed() > ROUND_TIMEOUT {
                warn!("[round {}] timeout waiting for updates, proceeding", round);
                break;
            }
            sleep(POLL_INTERVAL).await;
        }

        match api.finish_round().await {
            Ok(finished) => {
                round_times.push(round_start.elapsed());
                info!("[round {}] aggregated, now round={}", round, finished.round);
            }
            Err(err) => {
                failures += 1;
                warn!("[round {}] failed: {}", round, err);
            }
        }
    }

    let total = training_start.elapsed();
    let model = api.model().await?;
    summarize(&settings, &model.training_weights, model.training_round, &round_times, failures, total);
    Ok(())
}

fn summarize(
    settings: &CoordinatorSettings,
    weights: &[f64],
    final_round: u64,
    round_times: &[Duration],
    failures: u64,
    total: Duration,
) {
    let norm = weights.iter().map(|w| w * w).sum::<f64>().sqrt();
    println!("\n===== TRAINING SUMMARY =====");
    println!("Rounds run           : {}", settings.rounds);
    if failures > 0 {
        println!("Failed rounds        : {}", failures);
    }
    if !round_times.is_empty() {
        let times: Vec<String> = round_times
            .iter()
            .map(|t| format!("{:.2}", t.as_secs_f64()))
            .collect();
        let mean = round_times.iter().map(Duration::as_secs_f64).sum::<f64>()
            / round_times.len() as f64;
        println!("Time per round (s)   : {}", times.join(", "));
        println!("Total time (s)       : {:.2}", total.as_secs_f64());
        println!("Avg round time (s)   : {:.2}", mean);
    }
    println!("Final server round   : {}", final_round);
    println!("Weight vector length : {}", weights.len());
    println!("||w||                : {:.4}", norm);
    if !weights.is_empty() {
        let head: Vec<String> = weights.iter().take(5).map(|w| format!("{:.4}", w)).collect();
        let ellipsis = if weights.len() > 5 { ", …" } else { "" };
        println!("First 5 weights      : [{}{}]", head.join(", "), ellipsis);
    }
    println!(
        "Export URL           : {}/export  (JSON download)\n",
        settings.server.trim_end_matches('/')
    );
    println!("Training finished.");
}
