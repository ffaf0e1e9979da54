use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::models::ScrapeRequest;
use crate::pipeline::BatchPipeline;
use crate::scraper::MarketDataSource;

const SERVICE_NAME: &str = "AGMARKNET Market Price Scraper";

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn MarketDataSource>,
    pub batch_delay: Duration,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScrapeParams {
    state: Option<String>,
    commodity: Option<String>,
    market: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MarketParams {
    state: Option<String>,
    commodity: Option<String>,
}

type JsonResponse = (StatusCode, Json<Value>);

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn failure(status: StatusCode, message: impl ToString) -> JsonResponse {
    (
        status,
        Json(json!({
            "success": false,
            "error": message.to_string(),
            "timestamp": Utc::now(),
        })),
    )
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/request", get(single_request))
        .route("/batch", post(batch_request))
        .route("/markets", get(list_markets))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/": "This documentation",
            "/health": "Health check",
            "/request": "Get market data for single commodity",
            "/batch": "Get market data for multiple commodities",
            "/markets": "Get available markets for state and commodity",
        },
        "usage": {
            "single_request": "/request?state=Maharashtra&commodity=Wheat&market=Pune",
            "batch_request": "/batch (POST with JSON array)",
            "get_markets": "/markets?state=Maharashtra&commodity=Wheat",
        },
        "timestamp": Utc::now(),
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "timestamp": Utc::now(),
    }))
}

async fn single_request(
    State(state): State<AppState>,
    Query(params): Query<ScrapeParams>,
) -> JsonResponse {
    let (Some(region), Some(commodity)) = (required(params.state), required(params.commodity))
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Missing required parameters",
                "required": ["state", "commodity"],
                "optional": ["market"],
            })),
        );
    };

    let request = ScrapeRequest::new(region, commodity, params.market);
    match state.source.fetch_prices(&request).await {
        Ok(records) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "count": records.len(),
                "data": records,
                "timestamp": Utc::now(),
                "request": request,
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "single scrape failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn batch_request(State(state): State<AppState>, body: Bytes) -> JsonResponse {
    let entries = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Array(entries)) if !entries.is_empty() => entries,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Invalid request format. Expected JSON array of requests.",
                })),
            );
        }
    };

    let pipeline = BatchPipeline::new(state.source, state.batch_delay);
    let outcome = match tokio::spawn(async move { pipeline.run(&entries).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "batch task aborted");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "count": outcome.records.len(),
            "data": outcome.records,
            "requests_processed": outcome.requests_processed,
            "timestamp": Utc::now(),
        })),
    )
}

async fn list_markets(
    State(state): State<AppState>,
    Query(params): Query<MarketParams>,
) -> JsonResponse {
    let (Some(region), Some(commodity)) = (required(params.state), required(params.commodity))
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing required parameters: state and commodity" })),
        );
    };

    let markets = state.source.fetch_markets(&region, &commodity).await;
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "state": region,
            "commodity": commodity,
            "count": markets.len(),
            "markets": markets,
            "timestamp": Utc::now(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::scraper::AgmarknetScraper;
    use crate::scraper::stub::{FakeLauncher, FakeScript, StubSource};
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<StubSource>) {
        let stub = Arc::new(StubSource::default());
        let state = AppState {
            source: stub.clone(),
            batch_delay: Duration::ZERO,
        };
        (build_app(state), stub)
    }

    async fn send(app: Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(body)
                    .expect("request"),
            )
            .await
            .expect("response");

        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: Value = serde_json::from_slice(&body).expect("json parse");
        (status, json)
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let (app, _) = app();
        send(app, Method::GET, uri, Body::empty()).await
    }

    #[tokio::test]
    async fn index_lists_endpoints() {
        let (status, json) = get_json("/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["service"], SERVICE_NAME);
        assert!(json["endpoints"]["/batch"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let (status, json) = get_json("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn request_without_commodity_is_bad_request() {
        let (status, json) = get_json("/request?state=Maharashtra").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["required"], json!(["state", "commodity"]));

        let (status, _) = get_json("/request?state=&commodity=Wheat").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn request_without_market_uses_first_discovered() {
        let (status, json) = get_json("/request?state=Maharashtra&commodity=Wheat").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["count"], 1);
        assert_eq!(json["data"][0]["Market"], "Pune");
        assert_eq!(json["data"][0]["Modal Price"], "2650.0");
        assert_eq!(json["data"][0]["Unit"], "Quintal");
        assert_eq!(json["request"]["state"], "Maharashtra");
        assert!(json["request"]["market"].is_null());
    }

    #[tokio::test]
    async fn request_through_scraper_uses_first_discovered_market() {
        let launcher = FakeLauncher::new(FakeScript::default());
        let state = AppState {
            source: Arc::new(AgmarknetScraper::with_launcher(
                AppConfig::default(),
                launcher.clone(),
            )),
            batch_delay: Duration::ZERO,
        };
        let (status, json) = send(
            build_app(state),
            Method::GET,
            "/request?state=Maharashtra&commodity=Wheat",
            Body::empty(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 1);
        assert_eq!(json["data"][0]["Market"], "Pune");
        assert_eq!(json["data"][0]["S.No"], "1");
        assert_eq!(json["data"][0]["Min Price"], "2400.0");
        assert!(json["data"][0]["Scraped At"].is_string());
        assert!(launcher.events().contains(&"select Pune".to_string()));
        assert_eq!(launcher.events().last().map(String::as_str), Some("close"));
    }

    #[tokio::test]
    async fn request_with_market_passes_it_through() {
        let (app, stub) = app();
        let (status, json) = send(
            app,
            Method::GET,
            "/request?state=Maharashtra&commodity=Wheat&market=Pune(Pimpri)",
            Body::empty(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"][0]["Market"], "Pune(Pimpri)");
        assert_eq!(stub.calls()[0].market.as_deref(), Some("Pune(Pimpri)"));
    }

    #[tokio::test]
    async fn request_timeout_is_server_error() {
        let (status, json) = get_json("/request?state=Kerala&commodity=Pepper").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("results table"));
    }

    #[tokio::test]
    async fn request_with_no_markets_is_server_error() {
        let (status, json) = get_json("/request?state=Nowhere&commodity=Wheat").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].as_str().unwrap().contains("no markets available"));
    }

    #[tokio::test]
    async fn batch_skips_invalid_entries() {
        let (app, stub) = app();
        let body = json!([
            {"state": "Punjab", "commodity": "Rice"},
            {"invalid": true},
        ]);
        let (status, json) = send(app, Method::POST, "/batch", Body::from(body.to_string())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["requests_processed"], 2);
        assert_eq!(json["count"], 1);
        assert_eq!(json["data"][0]["State"], "Punjab");
        assert_eq!(stub.calls().len(), 1);
    }

    #[tokio::test]
    async fn batch_rejects_non_array_bodies() {
        for body in [
            r#"{"state": "Punjab", "commodity": "Rice"}"#,
            "[]",
            "",
            "not json",
        ] {
            let (app, _) = app();
            let (status, json) = send(app, Method::POST, "/batch", Body::from(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
            assert!(json["error"].as_str().unwrap().contains("JSON array"));
        }
    }

    #[tokio::test]
    async fn markets_requires_both_params() {
        let (status, json) = get_json("/markets?commodity=Wheat").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("state and commodity"));
    }

    #[tokio::test]
    async fn markets_lists_discovered_names() {
        let (status, json) = get_json("/markets?state=Maharashtra&commodity=Wheat").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["markets"], json!(["Pune", "Pune(Pimpri)"]));
        assert_eq!(json["count"], 2);

        let (status, json) = get_json("/markets?state=Nowhere&commodity=Wheat").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 0);
    }
}
