//! Round state machine of the aggregation server.
//!
//! A single [`RoundEngine`] value holds the authoritative round counter, the
//! client roster, the expected participant set of the round in flight, the
//! masked updates collected so far and the per-round history. The engine is
//! shared with the HTTP layer through an [`EngineHandle`], which owns the one
//! mutual-exclusion primitive in the process; every operation runs under the
//! lock for its whole critical section and never performs I/O while holding
//! it.
pub mod error;

pub use self::error::{FinishError, SubmitError};

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::model::Model;

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
/// The observable state of the round state machine.
///
/// `Collect` exactly when an expected participant set is configured.
pub enum Phase {
    #[display(fmt = "Idle")]
    Idle,
    #[display(fmt = "Collect")]
    Collect,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Training metrics reported by one client for one round.
pub struct MetricBag {
    pub accuracy: f64,
    /// Any further metric keys a client chooses to report.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One completed round as recorded in the history.
pub struct RoundRecord {
    /// 1-based label of the completed round.
    pub round: u64,
    pub timestamp_utc: DateTime<Utc>,
    /// Participants that submitted, sorted.
    pub participants: Vec<String>,
    pub received: usize,
    /// Euclidean norm of the global weights after the update.
    pub weight_norm: f64,
    /// Per-client metric bags consumed from the finished round.
    pub accuracy: HashMap<String, MetricBag>,
}

#[derive(Debug, Clone, PartialEq)]
/// Outcome of an accepted submission, counted post-insertion under the lock.
pub struct SubmitOutcome {
    pub received: usize,
    pub all_received: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Snapshot of the round state for the status endpoint.
pub struct StatusView {
    pub round: u64,
    pub registered: Vec<String>,
    pub expected: Vec<String>,
    pub received: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
/// Snapshot of the global model.
pub struct ModelView {
    pub round: u64,
    pub weights: Model,
    pub feature_weight: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Full state export for the download endpoint.
pub struct ExportView {
    pub round: u64,
    pub feature_weight: usize,
    pub training_weights: Model,
    pub history: Vec<RoundRecord>,
    pub export_time: DateTime<Utc>,
}

#[derive(Debug)]
/// Authoritative state of one aggregation process.
pub struct RoundEngine {
    feature_weight: usize,
    weights: Model,
    round: u64,
    registered: Vec<String>,
    expected: HashSet<String>,
    updates: HashMap<String, Model>,
    metrics: HashMap<u64, HashMap<String, MetricBag>>,
    history: Vec<RoundRecord>,
}

impl RoundEngine {
    /// Creates an engine for `feature_weight` features with a zeroed global
    /// model at round 0.
    pub fn new(feature_weight: usize) -> Self {
        Self {
            feature_weight,
            weights: Model::zeros(feature_weight + 1),
            round: 0,
            registered: Vec::new(),
            expected: HashSet::new(),
            updates: HashMap::new(),
            metrics: HashMap::new(),
            history: Vec::new(),
        }
    }

    /// The number of model parameters, features plus bias.
    pub fn dim(&self) -> usize {
        self.feature_weight + 1
    }

    /// The current machine phase, derived from the expected set.
    pub fn phase(&self) -> Phase {
        if self.expected.is_empty() {
            Phase::Idle
        } else {
            Phase::Collect
        }
    }

    /// Idempotently appends a client to the roster and returns the roster.
    pub fn register(&mut self, client_id: &str) -> Vec<String> {
        if !self.registered.iter().any(|id| id == client_id) {
            debug!("client {} joins the roster", client_id);
            self.registered.push(client_id.to_string());
        }
        self.registered.clone()
    }

    /// The registered clients in insertion order.
    pub fn roster(&self) -> Vec<String> {
        self.registered.clone()
    }

    /// Configures the expected participant set of the current round and
    /// drops any updates collected so far.
    pub fn configure(&mut self, participants: &[String]) {
        self.expected = participants.iter().cloned().collect();
        self.updates.clear();
        info!(
            "round {} enters {} with {} expected participants",
            self.round,
            self.phase(),
            self.expected.len()
        );
    }

    /// Validates and stores one masked update, with the metric bag if one
    /// was reported.
    ///
    /// The rejection order is part of the protocol: unconfigured round,
    /// unexpected client, wrong round number, wrong vector length.
    pub fn submit(
        &mut self,
        client_id: &str,
        round: u64,
        update: Model,
        metrics: Option<MetricBag>,
    ) -> Result<SubmitOutcome, SubmitError> {
        if self.expected.is_empty() {
            return Err(SubmitError::RoundNotConfigured);
        }
        if !self.expected.contains(client_id) {
            return Err(SubmitError::NotExpected(client_id.to_string()));
        }
        if round != self.round {
            return Err(SubmitError::WrongRound {
                submitted: round,
                current: self.round,
            });
        }
        if update.len() != self.dim() {
            return Err(SubmitError::DimensionMismatch {
                expected: self.dim(),
                actual: update.len(),
            });
        }

        self.updates.insert(client_id.to_string(), update);
        if let Some(bag) = metrics {
            self.metrics
                .entry(self.round)
                .or_default()
                .insert(client_id.to_string(), bag);
        }
        Ok(SubmitOutcome {
            received: self.updates.len(),
            all_received: self.all_received(),
        })
    }

    /// Whether the configured participant set has submitted completely.
    pub fn all_received(&self) -> bool {
        self.updates.len() == self.expected.len()
            && self.updates.keys().all(|id| self.expected.contains(id))
    }

    /// Averages the collected updates into the global model, records the
    /// round in the history and advances the round counter.
    ///
    /// Returns the new round number together with the updated weights.
    pub fn aggregate_and_advance(&mut self) -> Result<(u64, Model), FinishError> {
        if !self.all_received() {
            return Err(FinishError::Incomplete {
                received: self.updates.len(),
                expected: self.expected.len(),
            });
        }
        // mask cancellation makes this the mean of the unmasked deltas; an
        // unconfigured round has nothing to average and stays where it is
        let aggregate = Model::mean(self.updates.values()).ok_or(FinishError::Incomplete {
            received: 0,
            expected: 0,
        })?;
        self.weights.add_assign(&aggregate);

        let mut participants: Vec<String> = self.updates.keys().cloned().collect();
        participants.sort();
        let round_metrics = self.metrics.remove(&self.round).unwrap_or_default();
        self.history.push(RoundRecord {
            round: self.round + 1,
            timestamp_utc: Utc::now(),
            received: participants.len(),
            participants,
            weight_norm: self.weights.l2_norm(),
            accuracy: round_metrics,
        });

        self.round += 1;
        self.expected.clear();
        self.updates.clear();
        info!(
            "round {} aggregated, machine back to {}",
            self.round,
            self.phase()
        );
        Ok((self.round, self.weights.clone()))
    }

    /// Snapshot for the status endpoint; the expected and received lists are
    /// sorted for a stable wire representation.
    pub fn status(&self) -> StatusView {
        let mut expected: Vec<String> = self.expected.iter().cloned().collect();
        expected.sort();
        let mut received: Vec<String> = self.updates.keys().cloned().collect();
        received.sort();
        StatusView {
            round: self.round,
            registered: self.registered.clone(),
            expected,
            received,
        }
    }

    /// Snapshot of the global model.
    pub fn model_view(&self) -> ModelView {
        ModelView {
            round: self.round,
            weights: self.weights.clone(),
            feature_weight: self.feature_weight,
        }
    }

    /// Full export of the model and the round history.
    pub fn export(&self) -> ExportView {
        ExportView {
            round: self.round,
            feature_weight: self.feature_weight,
            training_weights: self.weights.clone(),
            history: self.history.clone(),
            export_time: Utc::now(),
        }
    }
}

#[derive(Clone, Debug)]
/// Shared handle to the engine, passed into the HTTP handler closures.
pub struct EngineHandle(Arc<Mutex<RoundEngine>>);

impl EngineHandle {
    pub fn new(engine: RoundEngine) -> Self {
        Self(Arc::new(Mutex::new(engine)))
    }

    fn lock(&self) -> MutexGuard<'_, RoundEngine> {
        // a poisoned lock means a handler panicked mid-update; the round
        // state is unrecoverable at that point
        self.0.lock().expect("round state lock poisoned")
    }

    pub fn register(&self, client_id: &str) -> Vec<String> {
        self.lock().register(client_id)
    }

    pub fn roster(&self) -> Vec<String> {
        self.lock().roster()
    }

    pub fn configure(&self, participants: &[String]) {
        self.lock().configure(participants)
    }

    pub fn submit(
        &self,
        client_id: &str,
        round: u64,
        update: Model,
        metrics: Option<MetricBag>,
    ) -> Result<SubmitOutcome, SubmitError> {
        self.lock().submit(client_id, round, update, metrics)
    }

    pub fn aggregate_and_advance(&self) -> Result<(u64, Model), FinishError> {
        self.lock().aggregate_and_advance()
    }

    pub fn status(&self) -> StatusView {
        self.lock().status()
    }

    pub fn model_view(&self) -> ModelView {
        self.lock().model_view()
    }

    pub fn export(&self) -> ExportView {
        self.lock().export()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut engine = RoundEngine::new(2);
        engine.register("A");
        engine.register("B");
        let roster = engine.register("A");
        assert_eq!(roster, ids(&["A", "B"]));
    }

    #[test]
    fn test_phase_follows_expected_set() {
        let mut engine = RoundEngine::new(2);
        assert_eq!(engine.phase(), Phase::Idle);
        engine.configure(&ids(&["A"]));
        assert_eq!(engine.phase(), Phase::Collect);
        engine
            .submit("A", 0, Model::zeros(3), None)
            .expect("submission accepted");
        engine.aggregate_and_advance().expect("round complete");
        assert_eq!(engine.phase(), Phase::Idle);
    }

    #[test]
    fn test_submit_before_configure_is_rejected() {
        let mut engine = RoundEngine::new(2);
        engine.register("A");
        let err = engine.submit("A", 0, Model::zeros(3), None).unwrap_err();
        assert_eq!(err, SubmitError::RoundNotConfigured);
    }

    #[test]
    fn test_submit_from_unexpected_client_is_rejected() {
        let mut engine = RoundEngine::new(2);
        engine.configure(&ids(&["A", "B"]));
        let err = engine.submit("C", 0, Model::zeros(3), None).unwrap_err();
        assert_eq!(err, SubmitError::NotExpected("C".to_string()));
    }

    #[test]
    fn test_submit_with_wrong_round_is_rejected() {
        let mut engine = RoundEngine::new(2);
        engine.configure(&ids(&["A"]));
        let err = engine.submit("A", 1, Model::zeros(3), None).unwrap_err();
        assert_eq!(
            err,
            SubmitError::WrongRound {
                submitted: 1,
                current: 0
            }
        );
    }

    #[test]
    fn test_submit_with_wrong_length_is_rejected() {
        let mut engine = RoundEngine::new(2);
        engine.configure(&ids(&["A"]));
        let err = engine.submit("A", 0, Model::zeros(2), None).unwrap_err();
        assert_eq!(
            err,
            SubmitError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_rejection_order_checks_membership_before_round() {
        let mut engine = RoundEngine::new(2);
        engine.configure(&ids(&["A"]));
        // both the membership and the round number are wrong; membership wins
        let err = engine.submit("C", 7, Model::zeros(3), None).unwrap_err();
        assert_eq!(err, SubmitError::NotExpected("C".to_string()));
    }

    #[test]
    fn test_finish_incomplete_round_is_rejected() {
        let mut engine = RoundEngine::new(2);
        engine.configure(&ids(&["A", "B"]));
        engine.submit("A", 0, Model::zeros(3), None).unwrap();
        let err = engine.aggregate_and_advance().unwrap_err();
        assert_eq!(
            err,
            FinishError::Incomplete {
                received: 1,
                expected: 2
            }
        );
        assert_eq!(engine.model_view().round, 0);
    }

    #[test]
    fn test_finish_unconfigured_round_is_rejected() {
        let mut engine = RoundEngine::new(2);
        let err = engine.aggregate_and_advance().unwrap_err();
        assert_eq!(
            err,
            FinishError::Incomplete {
                received: 0,
                expected: 0
            }
        );
    }

    #[test]
    fn test_aggregate_updates_weights_with_the_mean() {
        let mut engine = RoundEngine::new(1);
        engine.configure(&ids(&["A", "B"]));
        engine
            .submit("A", 0, Model(vec![1.0, 3.0]), None)
            .unwrap();
        engine
            .submit("B", 0, Model(vec![3.0, 1.0]), None)
            .unwrap();
        let (round, weights) = engine.aggregate_and_advance().unwrap();
        assert_eq!(round, 1);
        assert_eq!(weights, Model(vec![2.0, 2.0]));
        // the next round starts from the updated weights
        engine.configure(&ids(&["A"]));
        engine
            .submit("A", 1, Model(vec![1.0, 1.0]), None)
            .unwrap();
        let (_, weights) = engine.aggregate_and_advance().unwrap();
        assert_eq!(weights, Model(vec![3.0, 3.0]));
    }

    #[test]
    fn test_history_records_are_labelled_one_based() {
        let mut engine = RoundEngine::new(1);
        for round in 0..3 {
            engine.configure(&ids(&["A"]));
            engine
                .submit("A", round, Model::zeros(2), None)
                .unwrap();
            engine.aggregate_and_advance().unwrap();
        }
        let export = engine.export();
        assert_eq!(export.history.len(), 3);
        for (i, record) in export.history.iter().enumerate() {
            assert_eq!(record.round, i as u64 + 1);
        }
    }

    #[test]
    fn test_metrics_are_consumed_into_the_history() {
        let mut engine = RoundEngine::new(1);
        engine.configure(&ids(&["A"]));
        let bag = MetricBag {
            accuracy: 0.875,
            extra: HashMap::new(),
        };
        engine
            .submit("A", 0, Model::zeros(2), Some(bag.clone()))
            .unwrap();
        engine.aggregate_and_advance().unwrap();
        let record = &engine.export().history[0];
        assert_eq!(record.accuracy.get("A"), Some(&bag));
        assert_eq!(record.participants, ids(&["A"]));
        assert_eq!(record.received, 1);
    }

    #[test]
    fn test_reconfigure_drops_collected_updates() {
        let mut engine = RoundEngine::new(1);
        engine.configure(&ids(&["A", "B"]));
        engine.submit("A", 0, Model::zeros(2), None).unwrap();
        engine.configure(&ids(&["A", "B"]));
        assert_eq!(engine.status().received, Vec::<String>::new());
    }

    #[test]
    fn test_status_reports_sorted_sets() {
        let mut engine = RoundEngine::new(1);
        engine.register("B");
        engine.register("A");
        engine.configure(&ids(&["B", "A"]));
        engine.submit("B", 0, Model::zeros(2), None).unwrap();
        let status = engine.status();
        assert_eq!(status.registered, ids(&["B", "A"]));
        assert_eq!(status.expected, ids(&["A", "B"]));
        assert_eq!(status.received, ids(&["B"]));
    }
}
