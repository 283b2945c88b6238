//! HTTP server and route handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use sicbo_core::ChannelId;
use sicbo_telemetry::Metrics;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::config::ApiConfig;
use crate::error::{ApiError, QueryError, QueryResult};
use crate::query::FeedQuery;
use crate::types::{
    ChannelHistory, ChannelPrediction, ChannelResult, LatestRound, RefreshResponse,
    ShortPrediction, StatusReport,
};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    query: Arc<dyn FeedQuery>,
    config: ApiConfig,
}

impl ApiState {
    pub fn new(query: Arc<dyn FeedQuery>, config: ApiConfig) -> Self {
        Self { query, config }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

/// Create the router with all routes.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/channels", get(get_channels))
        .route("/api/latest", get(get_all_latest))
        .route("/api/latest/{channel}", get(get_latest))
        .route("/api/history/{channel}", get(get_history))
        .route("/api/predict", get(get_all_predictions))
        .route("/api/predict/{channel}", get(get_prediction))
        .route("/api/predict/{channel}/short", get(get_short_prediction))
        .route("/api/refresh", get(refresh).post(refresh))
        .route("/metrics", get(get_metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until `shutdown` is cancelled.
pub async fn run_server(
    query: Arc<dyn FeedQuery>,
    config: ApiConfig,
    shutdown: CancellationToken,
) -> Result<(), ApiError> {
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ApiError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!(%addr, "Query API listening");

    let app = create_router(ApiState::new(query, config));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Query API stopped");
    Ok(())
}

/// Path segment to a configured channel.
fn resolve(state: &ApiState, name: &str) -> QueryResult<ChannelId> {
    ChannelId::new(name)
        .ok()
        .filter(|channel| state.query.channels().contains(channel))
        .ok_or_else(|| QueryError::ChannelNotFound(name.to_string()))
}

fn collect<T>(
    state: &ApiState,
    mut f: impl FnMut(&ChannelId) -> QueryResult<T>,
) -> BTreeMap<String, ChannelResult<T>> {
    state
        .query
        .channels()
        .iter()
        .map(|channel| {
            let entry = match f(channel) {
                Ok(value) => ChannelResult::Ready(value),
                Err(e) => ChannelResult::Unavailable(e.body()),
            };
            (channel.to_string(), entry)
        })
        .collect()
}

async fn get_status(State(state): State<ApiState>) -> Json<StatusReport> {
    Json(state.query.status())
}

async fn get_channels(State(state): State<ApiState>) -> Json<Vec<ChannelId>> {
    Json(state.query.channels())
}

async fn get_all_latest(
    State(state): State<ApiState>,
) -> Json<BTreeMap<String, ChannelResult<LatestRound>>> {
    Json(collect(&state, |channel| state.query.latest_round(channel)))
}

async fn get_latest(
    State(state): State<ApiState>,
    Path(channel): Path<String>,
) -> QueryResult<Json<LatestRound>> {
    let channel = resolve(&state, &channel)?;
    Ok(Json(state.query.latest_round(&channel)?))
}

async fn get_history(
    State(state): State<ApiState>,
    Path(channel): Path<String>,
    Query(params): Query<HistoryParams>,
) -> QueryResult<Json<ChannelHistory>> {
    let channel = resolve(&state, &channel)?;
    let limit = params.limit.unwrap_or(state.config.default_history_limit);
    Ok(Json(state.query.history(&channel, limit)?))
}

async fn get_all_predictions(
    State(state): State<ApiState>,
) -> Json<BTreeMap<String, ChannelResult<ChannelPrediction>>> {
    Json(collect(&state, |channel| state.query.predict(channel)))
}

async fn get_prediction(
    State(state): State<ApiState>,
    Path(channel): Path<String>,
) -> QueryResult<Json<ChannelPrediction>> {
    let channel = resolve(&state, &channel)?;
    Ok(Json(state.query.predict(&channel)?))
}

async fn get_short_prediction(
    State(state): State<ApiState>,
    Path(channel): Path<String>,
) -> QueryResult<Json<ShortPrediction>> {
    let channel = resolve(&state, &channel)?;
    Ok(Json(state.query.predict(&channel)?.into()))
}

async fn refresh(State(state): State<ApiState>) -> QueryResult<Json<RefreshResponse>> {
    state.query.request_refresh().inspect_err(|e| {
        warn!(error = %e, "Refresh rejected");
    })?;
    Ok(Json(RefreshResponse {
        success: true,
        message: "subscription refresh queued".to_string(),
    }))
}

async fn get_metrics() -> Response {
    match Metrics::gather_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MockFeedQuery;
    use crate::types::{ChannelStatus, RoundView};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use chrono::Utc;
    use sicbo_core::Outcome;
    use sicbo_predict::OutcomePredictor;
    use sicbo_ws::{HeartbeatMonitor, Session};
    use tower::ServiceExt;

    fn channel(name: &str) -> ChannelId {
        ChannelId::new(name).unwrap()
    }

    fn mock_with_channels() -> MockFeedQuery {
        let mut mock = MockFeedQuery::new();
        mock.expect_channels()
            .returning(|| vec![channel("tx"), channel("md5")]);
        mock
    }

    fn latest(name: &str) -> LatestRound {
        LatestRound {
            channel: channel(name),
            round: RoundView {
                sid: 102,
                d1: 6,
                d2: 6,
                d3: 6,
                total: 18,
                outcome: Outcome::High,
            },
            last_updated: Some(Utc::now()),
            timestamp: Utc::now(),
        }
    }

    fn router(mock: MockFeedQuery) -> Router {
        create_router(ApiState::new(Arc::new(mock), ApiConfig::default()))
    }

    async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_latest_round() {
        let mut mock = mock_with_channels();
        mock.expect_latest_round()
            .withf(|c| c.as_str() == "tx")
            .returning(|c| Ok(latest(c.as_str())));

        let (status, json) = send(router(mock), Method::GET, "/api/latest/tx").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["sid"], 102);
        assert_eq!(json["total"], 18);
        assert_eq!(json["outcome"], "high");
        assert_eq!(json["channel"], "tx");
    }

    #[tokio::test]
    async fn test_unknown_channel_is_404() {
        let mut mock = mock_with_channels();
        mock.expect_latest_round().never();

        let (status, json) = send(router(mock), Method::GET, "/api/latest/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "channel_not_found");
    }

    #[tokio::test]
    async fn test_no_data_is_404() {
        let mut mock = mock_with_channels();
        mock.expect_predict()
            .returning(|c| Err(QueryError::NoData(c.to_string())));

        let (status, json) = send(router(mock), Method::GET, "/api/predict/md5").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "no_data");
    }

    #[tokio::test]
    async fn test_history_uses_default_limit() {
        let mut mock = mock_with_channels();
        mock.expect_history()
            .withf(|c, limit| c.as_str() == "tx" && *limit == 20)
            .returning(|c, _| {
                Ok(ChannelHistory {
                    channel: c.clone(),
                    count: 0,
                    rounds: Vec::new(),
                    last_updated: None,
                    timestamp: Utc::now(),
                })
            });

        let (status, _) = send(router(mock), Method::GET, "/api/history/tx").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_history_explicit_limit() {
        let mut mock = mock_with_channels();
        mock.expect_history()
            .withf(|_, limit| *limit == 5)
            .returning(|c, _| {
                Ok(ChannelHistory {
                    channel: c.clone(),
                    count: 0,
                    rounds: Vec::new(),
                    last_updated: None,
                    timestamp: Utc::now(),
                })
            });

        let (status, json) = send(router(mock), Method::GET, "/api/history/tx?limit=5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 0);
    }

    #[tokio::test]
    async fn test_all_latest_mixes_ready_and_missing() {
        let mut mock = mock_with_channels();
        mock.expect_latest_round().returning(|c| {
            if c.as_str() == "tx" {
                Ok(latest("tx"))
            } else {
                Err(QueryError::NoData(c.to_string()))
            }
        });

        let (status, json) = send(router(mock), Method::GET, "/api/latest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["tx"]["sid"], 102);
        assert_eq!(json["md5"]["error"], "no_data");
    }

    #[tokio::test]
    async fn test_short_prediction() {
        let predictor = OutcomePredictor::default();
        let prediction = predictor.predict_outcomes(&[Outcome::High; 5]);

        let mut mock = mock_with_channels();
        mock.expect_predict().returning(move |c| {
            Ok(ChannelPrediction {
                channel: c.clone(),
                latest_sid: Some(102),
                prediction: prediction.clone(),
                timestamp: Utc::now(),
            })
        });

        let (status, json) = send(router(mock), Method::GET, "/api/predict/tx/short").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["forecast"], "high");
        assert_eq!(json["confidence"], "84.6%");
        assert_eq!(json["latest_sid"], 102);
    }

    #[tokio::test]
    async fn test_full_prediction_is_flattened() {
        let prediction = OutcomePredictor::default().predict_outcomes(&[Outcome::Low; 6]);

        let mut mock = mock_with_channels();
        mock.expect_predict().returning(move |c| {
            Ok(ChannelPrediction {
                channel: c.clone(),
                latest_sid: Some(7),
                prediction: prediction.clone(),
                timestamp: Utc::now(),
            })
        });

        let (status, json) = send(router(mock), Method::GET, "/api/predict/md5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["forecast"], "low");
        assert_eq!(json["diagnostics"]["total_sessions"], 6);
    }

    #[tokio::test]
    async fn test_refresh_status_codes() {
        for (err, expected) in [
            (QueryError::NotReady, StatusCode::BAD_REQUEST),
            (QueryError::SessionFailed, StatusCode::SERVICE_UNAVAILABLE),
        ] {
            let mut mock = MockFeedQuery::new();
            mock.expect_request_refresh()
                .times(1)
                .returning(move || Err(err.clone()));
            let (status, _) = send(router(mock), Method::POST, "/api/refresh").await;
            assert_eq!(status, expected);
        }

        let mut mock = MockFeedQuery::new();
        mock.expect_request_refresh().times(1).returning(|| Ok(()));
        let (status, json) = send(router(mock), Method::GET, "/api/refresh").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
    }

    #[tokio::test]
    async fn test_status() {
        let mut mock = MockFeedQuery::new();
        mock.expect_status().returning(|| StatusReport {
            session: Session::new(),
            heartbeat: HeartbeatMonitor::new(25000).stats(),
            channels: vec![ChannelStatus {
                channel: channel("tx"),
                has_data: false,
                rounds: 0,
                latest_sid: None,
                last_updated: None,
            }],
            timestamp: Utc::now(),
        });

        let (status, json) = send(router(mock), Method::GET, "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"], "disconnected");
        assert_eq!(json["authenticated"], false);
        assert_eq!(json["heartbeat"]["interval_ms"], 25000);
        assert_eq!(json["channels"][0]["channel"], "tx");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        Metrics::reconnect_scheduled();
        let app = router(MockFeedQuery::new());
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("sicbo_reconnect_total"));
    }
}
