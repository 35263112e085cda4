//! REST API of the aggregation server.
//!
//! Exposes the round state machine over HTTP/1.1 with JSON bodies. The
//! engine handle is injected into every handler closure through a filter,
//! so multiple server instances can run side by side in tests.
pub mod messages;

use std::convert::Infallible;

use serde::Serialize;
use tracing::warn;
use warp::{
    http::{Response, StatusCode},
    reply::{self, Reply},
    Filter,
};

use crate::engine::{EngineHandle, FinishError, SubmitError};
use crate::rest::messages::*;

/// Builds the complete route tree over one engine handle.
pub fn routes(
    engine: EngineHandle,
) -> impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone {
    let register = warp::path!("register")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(register);
    let roster = warp::path!("roster")
        .and(warp::get())
        .and(with_engine(engine.clone()))
        .and_then(roster);
    let model = warp::path!("model")
        .and(warp::get())
        .and(with_engine(engine.clone()))
        .and_then(model);
    let configure = warp::path!("configure-training-round")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(configure);
    let submit = warp::path!("submit-update")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(submit);
    let finish = warp::path!("finish-round")
        .and(warp::post())
        .and(with_engine(engine.clone()))
        .and_then(finish);
    let status = warp::path!("status")
        .and(warp::get())
        .and(with_engine(engine.clone()))
        .and_then(status);
    let export = warp::path!("export")
        .and(warp::get())
        .and(with_engine(engine))
        .and_then(export);

    register
        .or(roster)
        .or(model)
        .or(configure)
        .or(submit)
        .or(finish)
        .or(status)
        .or(export)
}

/// Runs the HTTP server until the task is dropped.
pub async fn serve(addr: std::net::SocketAddr, engine: EngineHandle) -> Result<(), Infallible> {
    warp::serve(routes(engine).with(warp::log("http")))
        .run(addr)
        .await;
    Ok(())
}

/// Converts an engine handle into a [`warp`] filter.
fn with_engine(
    engine: EngineHandle,
) -> impl Filter<Extract = (EngineHandle,), Error = Infallible> + Clone {
    warp::any().map(move || engine.clone())
}

fn json_with_status<T: Serialize>(body: &T, status: StatusCode) -> warp::reply::Response {
    reply::with_status(reply::json(body), status).into_response()
}

async fn register(
    body: RegisterRequest,
    engine: EngineHandle,
) -> Result<warp::reply::Response, Infallible> {
    if body.client_id.is_empty() {
        return Ok(json_with_status(
            &ErrorResponse::with_message("invalid_client_id", "client_id must be non-empty"),
            StatusCode::BAD_REQUEST,
        ));
    }
    let clients = engine.register(&body.client_id);
    Ok(reply::json(&RegisterResponse { ok: true, clients }).into_response())
}

async fn roster(engine: EngineHandle) -> Result<impl Reply, Infallible> {
    Ok(reply::json(&RosterResponse {
        clients: engine.roster(),
    }))
}

async fn model(engine: EngineHandle) -> Result<impl Reply, Infallible> {
    let view = engine.model_view();
    Ok(reply::json(&ModelResponse {
        training_round: view.round,
        training_weights: view.weights.0,
        feature_weight: view.feature_weight,
    }))
}

async fn configure(
    body: ConfigureRequest,
    engine: EngineHandle,
) -> Result<impl Reply, Infallible> {
    engine.configure(&body.participants);
    Ok(reply::json(&ConfigureResponse {
        ok: true,
        participants: body.participants,
    }))
}

async fn submit(
    body: SubmitRequest,
    engine: EngineHandle,
) -> Result<warp::reply::Response, Infallible> {
    let outcome = engine.submit(
        &body.client_id,
        body.round,
        body.masked_update.into(),
        body.metrics,
    );
    Ok(match outcome {
        Ok(outcome) => reply::json(&SubmitResponse {
            ok: true,
            received: outcome.received,
            all_received: outcome.all_received,
        })
        .into_response(),
        Err(err) => {
            warn!("update from {} rejected: {}", body.client_id, err);
            let status = match err {
                SubmitError::RoundNotConfigured | SubmitError::NotExpected(_) => {
                    StatusCode::CONFLICT
                }
                SubmitError::WrongRound { .. } | SubmitError::DimensionMismatch { .. } => {
                    StatusCode::BAD_REQUEST
                }
            };
            let body = match err {
                SubmitError::DimensionMismatch { .. } => {
                    ErrorResponse::with_message(err.kind(), err.to_string())
                }
                _ => ErrorResponse::new(err.kind()),
            };
            json_with_status(&body, status)
        }
    })
}

async fn finish(engine: EngineHandle) -> Result<warp::reply::Response, Infallible> {
    Ok(match engine.aggregate_and_advance() {
        Ok((round, weights)) => reply::json(&FinishResponse {
            ok: true,
            round,
            weight: weights.0,
        })
        .into_response(),
        Err(err @ FinishError::Incomplete { .. }) => {
            warn!("finish-round rejected: {}", err);
            json_with_status(&ErrorResponse::new(err.kind()), StatusCode::BAD_REQUEST)
        }
    })
}

async fn status(engine: EngineHandle) -> Result<impl Reply, Infallible> {
    let view = engine.status();
    Ok(reply::json(&StatusResponse {
        round: view.round,
        registered: view.registered,
        expected: view.expected,
        received: view.received,
    }))
}

async fn export(engine: EngineHandle) -> Result<warp::reply::Response, Infallible> {
    let view = engine.export();
    let document = ExportDocument {
        round: view.round,
        feature_weight: view.feature_weight,
        training_weights: view.training_weights.0,
        history: view.history,
        export_time: view.export_time,
    };
    let body = serde_json::to_string(&document).unwrap_or_else(|e| {
        warn!("serializing the export document failed: {:?}", e);
        String::from("{}")
    });
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .header(
            "content-disposition",
            "attachment; filename=\"model_export.json\"",
        )
        .body(body.into())
        .unwrap_or_else(|_| {
            reply::with_status(reply::json(&{}), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RoundEngine;
    use crate::mask::{roster_mask, MASK_SECRET};

    fn api(
        feature_weight: usize,
    ) -> (
        EngineHandle,
        impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone,
    ) {
        let engine = EngineHandle::new(RoundEngine::new(feature_weight));
        let filter = routes(engine.clone());
        (engine, filter)
    }

    async fn register_client(
        api: &(impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone + 'static),
        client_id: &str,
    ) {
        let res = warp::test::request()
            .method("POST")
            .path("/register")
            .json(&RegisterRequest {
                client_id: client_id.to_string(),
            })
            .reply(api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    async fn configure_round(
        api: &(impl Filter<Extract = impl Reply, Error = warp::Rejection> + Clone + 'static),
        participants: &[&str],
    ) {
        let res = warp::test::request()
            .method("POST")
            .path("/configure-training-round")
            .json(&ConfigureRequest {
                participants: participants.iter().map(|p| p.to_string()).collect(),
            })
            .reply(api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    fn error_kind(body: &[u8]) -> String {
        let err: ErrorResponse = serde_json::from_slice(body).unwrap();
        assert!(!err.ok);
        err.error
    }

    #[tokio::test]
    async fn test_register_and_roster() {
        let (_, api) = api(3);
        register_client(&api, "A").await;
        register_client(&api, "B").await;
        register_client(&api, "A").await;

        let res = warp::test::request().path("/roster").reply(&api).await;
        let roster: RosterResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(roster.clients, vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_client_id() {
        let (_, api) = api(3);
        let res = warp::test::request()
            .method("POST")
            .path("/register")
            .json(&RegisterRequest {
                client_id: String::new(),
            })
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(res.body()), "invalid_client_id");
    }

    #[tokio::test]
    async fn test_model_reports_feature_weight_and_zeroed_weights() {
        let (_, api) = api(12);
        let res = warp::test::request().path("/model").reply(&api).await;
        let model: ModelResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(model.training_round, 0);
        assert_eq!(model.feature_weight, 12);
        assert_eq!(model.training_weights, vec![0.0; 13]);
    }

    #[tokio::test]
    async fn test_submit_before_configure_is_rejected() {
        let (_, api) = api(3);
        let res = warp::test::request()
            .method("POST")
            .path("/submit-update")
            .json(&SubmitRequest {
                client_id: "A".to_string(),
                round: 0,
                masked_update: vec![0.0; 4],
                metrics: None,
            })
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(error_kind(res.body()), "round_not_configured");
    }

    #[tokio::test]
    async fn test_submit_from_unexpected_client_is_rejected() {
        let (_, api) = api(3);
        for id in ["A", "B", "C"] {
            register_client(&api, id).await;
        }
        configure_round(&api, &["A", "B"]).await;

        let res = warp::test::request()
            .method("POST")
            .path("/submit-update")
            .json(&SubmitRequest {
                client_id: "C".to_string(),
                round: 0,
                masked_update: vec![0.0; 4],
                metrics: None,
            })
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(error_kind(res.body()), "not_expected");
    }

    #[tokio::test]
    async fn test_submit_with_wrong_round_is_rejected() {
        let (_, api) = api(3);
        register_client(&api, "A").await;
        configure_round(&api, &["A"]).await;

        let res = warp::test::request()
            .method("POST")
            .path("/submit-update")
            .json(&SubmitRequest {
                client_id: "A".to_string(),
                round: 1,
                masked_update: vec![0.0; 4],
                metrics: None,
            })
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(res.body()), "wrong_round");
    }

    #[tokio::test]
    async fn test_submit_with_wrong_length_is_rejected_with_message() {
        let (_, api) = api(3);
        register_client(&api, "A").await;
        configure_round(&api, &["A"]).await;

        let res = warp::test::request()
            .method("POST")
            .path("/submit-update")
            .json(&SubmitRequest {
                client_id: "A".to_string(),
                round: 0,
                masked_update: vec![0.0; 3],
                metrics: None,
            })
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(err.error, "dimension_mismatch");
        assert!(err.error_message.is_some());
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_bad_request() {
        let (_, api) = api(3);
        let res = warp::test::request()
            .method("POST")
            .path("/submit-update")
            .header("content-type", "application/json")
            .body("{\"client_id\": 42}")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_finish_incomplete_round_leaves_the_round_unchanged() {
        let (_, api) = api(3);
        register_client(&api, "A").await;
        register_client(&api, "B").await;
        configure_round(&api, &["A", "B"]).await;

        let res = warp::test::request()
            .method("POST")
            .path("/submit-update")
            .json(&SubmitRequest {
                client_id: "A".to_string(),
                round: 0,
                masked_update: vec![0.0; 4],
                metrics: None,
            })
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = warp::test::request()
            .method("POST")
            .path("/finish-round")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_kind(res.body()), "incomplete");

        let res = warp::test::request().path("/model").reply(&api).await;
        let model: ModelResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(model.training_round, 0);
    }

    #[tokio::test]
    async fn test_two_masked_zero_deltas_aggregate_to_zero() {
        let (_, api) = api(3);
        let participants = vec!["A".to_string(), "B".to_string()];
        for id in &participants {
            register_client(&api, id).await;
        }
        configure_round(&api, &["A", "B"]).await;

        for id in &participants {
            let mask = roster_mask(MASK_SECRET, id, &participants, 4);
            let res = warp::test::request()
                .method("POST")
                .path("/submit-update")
                .json(&SubmitRequest {
                    client_id: id.clone(),
                    round: 0,
                    masked_update: mask,
                    metrics: None,
                })
                .reply(&api)
                .await;
            assert_eq!(res.status(), StatusCode::OK);
        }

        let res = warp::test::request()
            .method("POST")
            .path("/finish-round")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let finish: FinishResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(finish.round, 1);

        let res = warp::test::request().path("/model").reply(&api).await;
        let model: ModelResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(model.training_round, 1);
        for weight in model.training_weights {
            assert!(weight.abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_training_round_is_monotone() {
        let (_, api) = api(1);
        register_client(&api, "A").await;
        let mut last = 0;
        for round in 0..3u64 {
            configure_round(&api, &["A"]).await;
            let res = warp::test::request()
                .method("POST")
                .path("/submit-update")
                .json(&SubmitRequest {
                    client_id: "A".to_string(),
                    round,
                    masked_update: vec![0.1, 0.1],
                    metrics: None,
                })
                .reply(&api)
                .await;
            assert_eq!(res.status(), StatusCode::OK);
            warp::test::request()
                .method("POST")
                .path("/finish-round")
                .reply(&api)
                .await;

            let res = warp::test::request().path("/model").reply(&api).await;
            let model: ModelResponse = serde_json::from_slice(res.body()).unwrap();
            assert!(model.training_round >= last);
            last = model.training_round;
        }
        assert_eq!(last, 3);
    }

    #[tokio::test]
    async fn test_status_tracks_received_set() {
        let (_, api) = api(1);
        register_client(&api, "A").await;
        register_client(&api, "B").await;
        configure_round(&api, &["B", "A"]).await;

        let res = warp::test::request().path("/status").reply(&api).await;
        let status: StatusResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(status.round, 0);
        assert_eq!(status.expected, vec!["A".to_string(), "B".to_string()]);
        assert!(status.received.is_empty());

        let res = warp::test::request()
            .method("POST")
            .path("/submit-update")
            .json(&SubmitRequest {
                client_id: "B".to_string(),
                round: 0,
                masked_update: vec![0.0, 0.0],
                metrics: None,
            })
            .reply(&api)
            .await;
        let submit: SubmitResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(submit.received, 1);
        assert!(!submit.all_received);

        let res = warp::test::request().path("/status").reply(&api).await;
        let status: StatusResponse = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(status.received, vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn test_export_is_a_json_attachment() {
        let (_, api) = api(2);
        let res = warp::test::request().path("/export").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
        let disposition = res
            .headers()
            .get("content-disposition")
            .expect("attachment header")
            .to_str()
            .unwrap();
        assert!(disposition.starts_with("attachment"));
        let document: ExportDocument = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(document.round, 0);
        assert_eq!(document.feature_weight, 2);
        assert!(document.history.is_empty());
    }
}
