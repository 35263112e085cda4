//! Logistic regression learner used for the local training passes.
//!
//! The model carries `feature_weight + 1` parameters: one weight per feature
//! plus a trailing bias, which corresponds to a constant `1.0` column
//! appended to every sample.
use displaydoc::Display;
use thiserror::Error;

use crate::core::model::Model;

#[derive(Debug, Display, Error, PartialEq, Eq)]
/// Errors related to the local learner.
pub enum LearnerError {
    /// weight vector has length {actual} but the learner expects {expected}.
    DimensionMismatch { expected: usize, actual: usize },
    /// feature matrix and target vector disagree: {rows} rows vs {targets} targets.
    ShapeMismatch { rows: usize, targets: usize },
    /// cannot run a training pass on an empty batch.
    EmptyBatch,
}

/// The standard logistic function.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone)]
/// Logistic regression with bias trained by full-batch gradient descent.
pub struct Logistic {
    dim: usize,
    weights: Model,
}

impl Logistic {
    /// Creates a learner for `feature_weight` features with all-zero weights.
    pub fn new(feature_weight: usize) -> Self {
        let dim = feature_weight + 1;
        Self {
            dim,
            weights: Model::zeros(dim),
        }
    }

    /// The number of parameters, features plus bias.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The number of input features.
    pub fn feature_weight(&self) -> usize {
        self.dim - 1
    }

    /// A copy of the current weight vector.
    pub fn weights(&self) -> Model {
        self.weights.clone()
    }

    /// Replaces the weight vector.
    pub fn set_weights(&mut self, weights: Model) -> Result<(), LearnerError> {
        if weights.len() != self.dim {
            return Err(LearnerError::DimensionMismatch {
                expected: self.dim,
                actual: weights.len(),
            });
        }
        self.weights = weights;
        Ok(())
    }

    /// `x · w` for one sample, with the bias weight standing in for the
    /// appended constant column.
    fn logit(weights: &Model, sample: &[f64]) -> f64 {
        let bias = weights.0[weights.len() - 1];
        sample
            .iter()
            .zip(weights.iter())
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + bias
    }

    /// Runs `epochs` full-batch gradient descent steps on the logistic loss
    /// and returns the weight delta `w_final − w_0`.
    ///
    /// The internal weights are left at `w_final`.
    pub fn update_local(
        &mut self,
        features: &[Vec<f64>],
        targets: &[f64],
        epochs: usize,
        learning_rate: f64,
    ) -> Result<Model, LearnerError> {
        if features.len() != targets.len() {
            return Err(LearnerError::ShapeMismatch {
                rows: features.len(),
                targets: targets.len(),
            });
        }
        if features.is_empty() {
            return Err(LearnerError::EmptyBatch);
        }
        for row in features {
            if row.len() != self.feature_weight() {
                return Err(LearnerError::DimensionMismatch {
                    expected: self.feature_weight(),
                    actual: row.len(),
                });
            }
        }

        let n = features.len() as f64;
        let start = self.weights.clone();
        let mut weights = start.clone();

        for _ in 0..epochs {
            // gradient = X_bᵀ (σ(X_b w) − y) / n, bias column last
            let mut gradient = Model::zeros(self.dim);
            for (row, y) in features.iter().zip(targets.iter()) {
                let residual = sigmoid(Self::logit(&weights, row)) - y;
                for (g, x) in gradient.0.iter_mut().zip(row.iter()) {
                    *g += residual * x;
                }
                gradient.0[self.dim - 1] += residual;
            }
            for (w, g) in weights.iter_mut().zip(gradient.iter()) {
                *w -= learning_rate * g / n;
            }
        }

        let delta = Model(
            weights
                .iter()
                .zip(start.iter())
                .map(|(w, w0)| w - w0)
                .collect(),
        );
        self.weights = weights;
        Ok(delta)
    }

    /// The predicted probability `σ(x · w)` for each sample.
    pub fn predict_probability(&self, features: &[Vec<f64>]) -> Vec<f64> {
        features
            .iter()
            .map(|row| sigmoid(Self::logit(&self.weights, row)))
            .collect()
    }

    /// Class predictions thresholded at 0.5.
    pub fn predict(&self, features: &[Vec<f64>]) -> Vec<u8> {
        self.predict_probability(features)
            .into_iter()
            .map(|p| u8::from(p >= 0.5))
            .collect()
    }

    /// Fraction of samples predicted correctly.
    pub fn accuracy(&self, features: &[Vec<f64>], targets: &[f64]) -> f64 {
        if features.is_empty() {
            return 0.0;
        }
        let hits = self
            .predict(features)
            .iter()
            .zip(targets.iter())
            .filter(|(p, y)| f64::from(**p) == **y)
            .count();
        hits as f64 / features.len() as f64
    }
}
