//! Integration tests for the gateway router.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Stores are stubs that are never reached because
//! no tick runs.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use fleetwatch_stream::{
    AlertStore, AppOriginPolicy, AppState, ConnectionGateway, HubConfig, ProbeQuery, ProbeStore,
    StoreError, StreamHub, build_router,
};
use fleetwatch_types::{AlertPage, ProbeSample, SubscriptionFilter};
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

const APP_ORIGIN: &str = "https://fleet.example.com";

/// `{"min_lon":0,"min_lat":0,"max_lon":1,"max_lat":1}`, URL-encoded.
const REGION_QUERY: &str =
    "region=%7B%22min_lon%22%3A0%2C%22min_lat%22%3A0%2C%22max_lon%22%3A1%2C%22max_lat%22%3A1%7D";

struct EmptyStores;

impl ProbeStore for EmptyStores {
    fn get_car_probe<'a>(
        &'a self,
        _query: &'a ProbeQuery,
    ) -> BoxFuture<'a, Result<Vec<ProbeSample>, StoreError>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}

impl AlertStore for EmptyStores {
    fn get_alerts_for_vehicles<'a>(
        &'a self,
        _mo_ids: &'a [String],
        _include_closed: bool,
        _limit: u32,
    ) -> BoxFuture<'a, Result<AlertPage, StoreError>> {
        Box::pin(async { Ok(AlertPage { alerts: Vec::new() }) })
    }
}

fn make_test_state() -> Arc<AppState> {
    let stores = Arc::new(EmptyStores);
    let hub = StreamHub::new(HubConfig::default(), stores.clone(), stores);
    let policy = AppOriginPolicy::new(Some(String::from(APP_ORIGIN)));
    let gateway = ConnectionGateway::new("/ws/probes", Arc::new(policy));
    Arc::new(AppState::new(Arc::new(hub), Arc::new(gateway)))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn subscribe_request(query: &str, origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(format!("/ws/probes?{query}"));
    if let Some(origin) = origin {
        builder = builder.header(header::ORIGIN, origin);
    }
    builder.body(Body::empty()).unwrap()
}

// =========================================================================
// REST
// =========================================================================

#[tokio::test]
async fn test_health_reports_client_count() {
    let state = make_test_state();
    let (tx, _rx) = mpsc::channel(1);
    state.hub.subscribe(
        SubscriptionFilter::Vehicle {
            mo_id: String::from("car-1"),
        },
        tx,
    );
    let app = build_router(state);

    let response = app
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["clients"], 1);
}

#[tokio::test]
async fn test_list_clients() {
    let state = make_test_state();
    let (tx, _rx) = mpsc::channel(1);
    let id = state.hub.subscribe(
        SubscriptionFilter::Vehicle {
            mo_id: String::from("car-1"),
        },
        tx,
    );
    let app = build_router(state);

    let response = app
        .oneshot(Request::get("/api/clients").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    let clients = json.as_array().unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["id"], id.to_string());
    assert_eq!(clients[0]["filter"]["kind"], "vehicle");
    assert_eq!(clients[0]["filter"]["mo_id"], "car-1");
}

#[tokio::test]
async fn test_list_clients_empty() {
    let app = build_router(make_test_state());

    let response = app
        .oneshot(Request::get("/api/clients").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json, serde_json::json!([]));
}

// =========================================================================
// Subscription route admission
// =========================================================================

#[tokio::test]
async fn test_foreign_origin_is_forbidden() {
    let app = build_router(make_test_state());

    let response = app
        .oneshot(subscribe_request(REGION_QUERY, Some("https://evil.example.org")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 403);
}

#[tokio::test]
async fn test_missing_origin_is_forbidden() {
    let app = build_router(make_test_state());

    let response = app.oneshot(subscribe_request(REGION_QUERY, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_missing_subscription_is_bad_request() {
    let app = build_router(make_test_state());

    let response = app
        .oneshot(subscribe_request("", Some(APP_ORIGIN)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_malformed_region_is_bad_request() {
    let app = build_router(make_test_state());

    let response = app
        .oneshot(subscribe_request("region=not-json", Some("http://localhost:3000")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admitted_plain_request_is_not_upgraded() {
    let state = make_test_state();
    let app = build_router(Arc::clone(&state));

    let response = app
        .oneshot(subscribe_request(REGION_QUERY, Some(APP_ORIGIN)))
        .await
        .unwrap();

    // Admitted and parsed, but a plain GET cannot be upgraded. The upgrade
    // rejection is axum's own plain-text body, not a gateway error.
    assert!(response.status().is_client_error());
    assert_ne!(response.status(), StatusCode::FORBIDDEN);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let gateway_error = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|json| json.get("status").cloned());
    assert!(gateway_error.is_none(), "{bytes:?}");
    assert_eq!(state.hub.client_count(), 0);
}
