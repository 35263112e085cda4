//! Participant protocol loop.
//!
//! One participant process per client: register, learn the model dimension,
//! synthesize the local dataset, then for every round fetch the global
//! weights, wait to be expected, train one local pass, mask the delta
//! against the round's participant set and submit. Transport errors never
//! abort the loop; they are retried at polling cadence.
pub mod data;

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Duration,
};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    core::{LearnerError, Logistic, Model},
    engine::MetricBag,
    mask::{roster_mask, MASK_SECRET},
    rest::messages::{ModelResponse, StatusResponse, SubmitRequest},
    service::Api,
};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
/// Runtime options of one participant.
pub struct ParticipantSettings {
    pub server: String,
    pub client_id: String,
    pub samples: usize,
    pub rounds: u64,
    pub learning_rate: f64,
    pub seed: u64,
}

/// Hash of the client identifier, stable for the process lifetime; spreads
/// the dataset seeds of participants sharing one `--seed`.
fn stable_hash(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Fetches the global model, retrying transport errors.
async fn wait_model(api: &Api) -> ModelResponse {
    loop {
        match api.model().await {
            Ok(model) => return model,
            Err(err) => {
                debug!("fetching the model failed: {}, retrying", err);
                sleep(RETRY_INTERVAL).await;
            }
        }
    }
}

/// Fetches the round status, retrying transport errors.
async fn wait_status(api: &Api) -> StatusResponse {
    loop {
        match api.status().await {
            Ok(status) => return status,
            Err(err) => {
                debug!("fetching the status failed: {}, retrying", err);
                sleep(RETRY_INTERVAL).await;
            }
        }
    }
}

/// Runs the participant until it has contributed to `rounds` rounds.
pub async fn run(settings: ParticipantSettings) -> Result<(), LearnerError> {
    let api = Api::new(&settings.server);

    // register, waiting for the server to come up
    let roster = loop {
        match api.register(&settings.client_id).await {
            Ok(reply) => break reply.clients,
            Err(err) => {
                warn!("registration failed: {}, retrying", err);
                sleep(RETRY_INTERVAL).await;
            }
        }
    };
    info!(
        "{} registered, {} clients on the roster",
        settings.client_id,
        roster.len()
    );

    let feature_weight = wait_model(&api).await.feature_weight;
    let dataset_seed = settings
        .seed
        .wrapping_add(stable_hash(&settings.client_id) % 1000);
    let (x, y) = data::generate_local(
        settings.samples,
        feature_weight,
        dataset_seed,
        data::DEFAULT_PREVALENCE,
    );
    let mut learner = Logistic::new(feature_weight);

    let mut contributed = 0;
    while contributed < settings.rounds {
        let mut model = wait_model(&api).await;
        learner.set_weights(Model(model.training_weights.clone()))?;

        // wait until this client is expected in the server's current round
        // and has not submitted yet (a received entry disappears only when
        // the round finishes or is reconfigured)
        let status = loop {
            let status = wait_status(&api).await;
            if status.round != model.training_round {
                model = wait_model(&api).await;
                learner.set_weights(Model(model.training_weights.clone()))?;
                continue;
            }
            let expected = status.expected.iter().any(|id| *id == settings.client_id);
            let received = status.received.iter().any(|id| *id == settings.client_id);
            if expected && !received {
                break status;
            }
            sleep(POLL_INTERVAL).await;
        };
        let round = status.round;

        let delta = learner.update_local(&x, &y, 1, settings.learning_rate)?;
        let accuracy = learner.accuracy(&x, &y);

        // mask against the authoritative participant set of this round
        let mask = roster_mask(
            MASK_SECRET,
            &settings.client_id,
            &status.expected,
            delta.len(),
        );
        let masked_update: Vec<f64> = delta.iter().zip(mask.iter()).map(|(d, m)| d + m).collect();

        let request = SubmitRequest {
            client_id: settings.client_id.clone(),
            round,
            masked_update,
            metrics: Some(MetricBag {
                accuracy,
                extra: Default::default(),
            }),
        };
        match api.submit_update(&request).await {
            Ok(reply) => {
                contributed += 1;
                info!(
                    "round {}: update accepted, {} received, complete: {} (local accuracy {:.3})",
                    round, reply.received, reply.all_received, accuracy
                );
            }
            Err(err) => match err.rejection_kind() {
                // the server moved on between the status check and the
                // submission; the next loop iteration resynchronizes
                Some(kind) => warn!("round {}: update rejected as {}", round, kind),
                None => warn!("round {}: submission failed in transit: {}", round, err),
            },
        }
    }

    info!(
        "{} contributed to {} rounds, leaving",
        settings.client_id, contributed
    );
    Ok(())
}
