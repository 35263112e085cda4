//! Client-side service layer for the aggregation REST API.
//!
//! Used by the participant and the coordinator; one typed method per
//! endpoint. 4xx replies are decoded into their wire-level error kind and
//! surfaced as [`ServiceError::Rejected`].
pub mod error;

pub use self::error::ServiceError;

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::rest::messages::{
    ConfigureRequest, ConfigureResponse, ErrorResponse, FinishResponse, ModelResponse,
    RegisterRequest, RegisterResponse, RosterResponse, StatusResponse, SubmitRequest,
    SubmitResponse,
};

/// A handle to the HTTP API of one aggregation server.
#[derive(Clone, Debug)]
pub struct Api {
    client: Client,
    base: String,
}

impl Api {
    /// Creates a handle for the server at `base`, e.g. `http://127.0.0.1:8000`.
    pub fn new(base: &str) -> Self {
        Self {
            client: Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    /// Decodes a reply, turning non-2xx statuses into [`ServiceError::Rejected`].
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
        if response.status().is_success() {
            return Ok(response.json::<T>().await?);
        }
        let status = response.status();
        let rejection = response
            .json::<ErrorResponse>()
            .await
            .unwrap_or_else(|_| ErrorResponse::new(status.as_str()));
        Err(ServiceError::Rejected {
            kind: rejection.error,
            message: rejection.error_message,
        })
    }

    pub async fn register(&self, client_id: &str) -> Result<RegisterResponse, ServiceError> {
        let response = self
            .client
            .post(self.url("register"))
            .json(&RegisterRequest {
                client_id: client_id.to_string(),
            })
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn roster(&self) -> Result<RosterResponse, ServiceError> {
        let response = self.client.get(self.url("roster")).send().await?;
        Self::decode(response).await
    }

    pub async fn model(&self) -> Result<ModelResponse, ServiceError> {
        let response = self.client.get(self.url("model")).send().await?;
        Self::decode(response).await
    }

    pub async fn configure_round(
        &self,
        participants: &[String],
    ) -> Result<ConfigureResponse, ServiceError> {
        let response = self
            .client
            .post(self.url("configure-training-round"))
            .json(&ConfigureRequest {
                participants: participants.to_vec(),
            })
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn submit_update(
        &self,
        request: &SubmitRequest,
    ) -> Result<SubmitResponse, ServiceError> {
        let response = self
            .client
            .post(self.url("submit-update"))
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn finish_round(&self) -> Result<FinishResponse, ServiceError> {
        let response = self.client.post(self.url("finish-round")).send().await?;
        Self::decode(response).await
    }

    pub async fn status(&self) -> Result<StatusResponse, ServiceError> {
        let response = self.client.get(self.url("status")).send().await?;
        Self::decode(response).await
    }
}
