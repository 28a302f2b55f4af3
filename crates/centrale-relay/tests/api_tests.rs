//! Integration tests for the relay's HTTP endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Subscribers are attached through the relay
//! handle, which is exactly what a `WebSocket` session does after the
//! upgrade.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use centrale_relay::relay::Subscription;
use centrale_relay::{build_router, spawn_relay, AppState, RelayHandle, RelayOptions};
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TryRecvError;
use tower::ServiceExt;

fn make_app() -> (Router, RelayHandle) {
    let (relay, _task) = spawn_relay(RelayOptions::default());
    let state = Arc::new(AppState::new(relay.clone()));
    (build_router(state), relay)
}

fn scenario_body() -> Value {
    json!({
        "voltage": 231.2,
        "current": 9.8,
        "activePower": 2.21,
        "reactivePower": 0.77,
        "energy": 140.0,
        "frequency": 49.98,
        "powerFactor": 0.96
    })
}

fn post_json(body: &Value) -> Request<Body> {
    Request::post("/api/measurements")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::get(path).body(Body::empty()).unwrap()
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn next_frame(sub: &mut Subscription) -> Value {
    let frame = sub.frames.recv().await.unwrap();
    serde_json::from_str(frame.as_str()).unwrap()
}

fn without_timestamp(mut value: Value) -> Value {
    if let Some(obj) = value.as_object_mut() {
        obj.remove("timestamp");
    }
    value
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_latest_before_any_post_is_404() {
    let (app, _relay) = make_app();

    let response = app.oneshot(get("/api/measurements/latest")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "no data yet");
}

#[tokio::test]
async fn test_post_returns_ok_true() {
    let (app, _relay) = make_app();

    let response = app.oneshot(post_json(&scenario_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json, json!({ "ok": true }));
}

#[tokio::test]
async fn test_latest_after_post_returns_body_with_assigned_timestamp() {
    let (app, _relay) = make_app();

    let response = app
        .clone()
        .oneshot(post_json(&scenario_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/api/measurements/latest")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;

    let timestamp = json["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    assert!(timestamp.ends_with('Z'));
    assert_eq!(without_timestamp(json), scenario_body());
}

#[tokio::test]
async fn test_producer_timestamp_round_trips_exactly() {
    let (app, _relay) = make_app();
    let mut body = scenario_body();
    body["timestamp"] = json!("2024-05-01T12:00:00.250Z");

    app.clone().oneshot(post_json(&body)).await.unwrap();
    let response = app.oneshot(get("/api/measurements/latest")).await.unwrap();

    assert_eq!(body_to_json(response.into_body()).await, body);
}

#[tokio::test]
async fn test_offset_less_iso_timestamps_are_accepted() {
    let (app, _relay) = make_app();

    for timestamp in ["2024-05-01T12:00:00", "2024-05-01"] {
        let mut body = scenario_body();
        body["timestamp"] = json!(timestamp);

        let response = app.clone().oneshot(post_json(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(get("/api/measurements/latest"))
            .await
            .unwrap();
        assert_eq!(body_to_json(response.into_body()).await, body);
    }
}

#[tokio::test]
async fn test_latest_returns_exactly_the_posted_body() {
    let (app, relay) = make_app();
    let mut sub = relay.subscribe().await.unwrap();
    let body = json!({
        "voltage": 230,
        "current": 10,
        "activePower": 2.3,
        "reactivePower": 0.8,
        "energy": 120,
        "frequency": 50,
        "powerFactor": 1,
        "timestamp": "2024-05-01T12:00:00.000Z",
        "meterId": "M-17"
    });

    let response = app.clone().oneshot(post_json(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/api/measurements/latest")).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = std::str::from_utf8(&bytes).unwrap();
    assert!(text.contains("\"voltage\":230,"));
    assert_eq!(serde_json::from_str::<Value>(text).unwrap(), body);

    let frame = sub.frames.recv().await.unwrap();
    assert!(frame.as_str().contains("\"meterId\":\"M-17\""));
    assert_eq!(serde_json::from_str::<Value>(frame.as_str()).unwrap(), body);
}

#[tokio::test]
async fn test_end_to_end_fan_out() {
    let (app, relay) = make_app();
    let mut first = relay.subscribe().await.unwrap();
    let mut second = relay.subscribe().await.unwrap();

    let response = app
        .clone()
        .oneshot(post_json(&scenario_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The POST resolves after fan-out, so the frames are already queued.
    let a = next_frame(&mut first).await;
    let b = next_frame(&mut second).await;
    assert_eq!(a, b);
    assert_eq!(without_timestamp(a.clone()), scenario_body());

    let response = app.oneshot(get("/api/measurements/latest")).await.unwrap();
    assert_eq!(body_to_json(response.into_body()).await, a);
}

#[tokio::test]
async fn test_subscriber_joining_later_gets_latest_first() {
    let (app, relay) = make_app();
    for voltage in [229.0, 230.0, 231.0] {
        let mut body = scenario_body();
        body["voltage"] = json!(voltage);
        app.clone().oneshot(post_json(&body)).await.unwrap();
    }

    let mut sub = relay.subscribe().await.unwrap();
    let first = next_frame(&mut sub).await;

    assert_eq!(first["voltage"], json!(231.0));
    assert!(matches!(sub.frames.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_missing_field_is_rejected_and_state_untouched() {
    let (app, relay) = make_app();
    let mut sub = relay.subscribe().await.unwrap();
    let mut body = scenario_body();
    body.as_object_mut().unwrap().remove("powerFactor");

    let response = app.clone().oneshot(post_json(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["ok"], false);
    assert!(json["error"].as_str().unwrap().contains("powerFactor"));

    let response = app.oneshot(get("/api/measurements/latest")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(matches!(sub.frames.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_out_of_range_power_factor_is_rejected() {
    let (app, _relay) = make_app();
    let mut body = scenario_body();
    body["powerFactor"] = json!(1.5);

    let response = app.oneshot(post_json(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_json_is_rejected() {
    let (app, _relay) = make_app();
    let request = Request::post("/api/measurements")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"voltage\": 230.5,"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["ok"], false);
}

#[tokio::test]
async fn test_missing_content_type_is_415() {
    let (app, _relay) = make_app();
    let request = Request::post("/api/measurements")
        .body(Body::from(scenario_body().to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let (relay, _task) = spawn_relay(RelayOptions::default());
    let state = Arc::new(AppState::new(relay).with_max_body_bytes(16));
    let app = build_router(state);

    let response = app.oneshot(post_json(&scenario_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_status_reports_counters() {
    let (app, relay) = make_app();
    let _sub = relay.subscribe().await.unwrap();
    app.clone()
        .oneshot(post_json(&scenario_body()))
        .await
        .unwrap();

    let response = app.oneshot(get("/api/status")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(
        json,
        json!({ "subscribers": 1, "hasMeasurement": true, "published": 1 })
    );
}

#[tokio::test]
async fn test_stopped_relay_returns_503() {
    let (app, relay) = make_app();
    relay.shutdown().await;
    while relay.is_running() {
        tokio::task::yield_now().await;
    }

    let response = app.oneshot(post_json(&scenario_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let (app, _relay) = make_app();
    let request = Request::get("/api/measurements/latest")
        .header(header::ORIGIN, "http://dashboard.local")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    let allow_origin = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .unwrap();
    assert_eq!(allow_origin, "*");
}

#[tokio::test]
async fn test_cors_preflight() {
    let (app, _relay) = make_app();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/measurements")
        .header(header::ORIGIN, "http://dashboard.local")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    let methods = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("POST"));
}

#[tokio::test]
async fn test_plain_get_on_websocket_route_is_not_ok() {
    let (app, _relay) = make_app();

    let response = app.oneshot(get("/ws/measurements")).await.unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_nonexistent_route_returns_404() {
    let (app, _relay) = make_app();

    let response = app.oneshot(get("/api/nonexistent")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
