//! Wire messages of the aggregation REST API.
//!
//! The same types serve the warp handlers on the server and the reqwest
//! client on the participant/coordinator side.
use serde::{Deserialize, Serialize};

use crate::engine::{MetricBag, RoundRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(rename = "OK")]
    pub ok: bool,
    pub clients: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterResponse {
    pub clients: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub training_round: u64,
    pub training_weights: Vec<f64>,
    /// Number of input features; the weight vector carries one more entry
    /// for the bias.
    pub feature_weight: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureRequest {
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureResponse {
    #[serde(rename = "OK")]
    pub ok: bool,
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub client_id: String,
    pub round: u64,
    pub masked_update: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricBag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "OK")]
    pub ok: bool,
    pub received: usize,
    pub all_received: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishResponse {
    #[serde(rename = "OK")]
    pub ok: bool,
    pub round: u64,
    pub weight: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub round: u64,
    pub registered: Vec<String>,
    pub expected: Vec<String>,
    pub received: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub round: u64,
    pub feature_weight: usize,
    pub training_weights: Vec<f64>,
    pub history: Vec<RoundRecord>,
    pub export_time: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Error body of every non-2xx reply.
pub struct ErrorResponse {
    #[serde(rename = "OK")]
    pub ok: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ErrorResponse {
    pub fn new(kind: &str) -> Self {
        Self {
            ok: false,
            error: kind.to_string(),
            error_message: None,
        }
    }

    pub fn with_message(kind: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: kind.to_string(),
            error_message: Some(message.into()),
        }
    }
}
