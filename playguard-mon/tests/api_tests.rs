//! Review API integration tests
//!
//! Drive the router directly with tower's oneshot; no sockets involved.

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use helpers::{engine_with, ScriptedSource};
use http_body_util::BodyExt;
use playguard_common::model::Label;
use playguard_mon::sources::SourceAdapter;
use playguard_mon::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

async fn test_router(adapters: Vec<Arc<dyn SourceAdapter>>) -> Router {
    let (engine, pool, overrides, event_bus) = engine_with(adapters).await;
    let state = AppState::new(pool, engine, overrides, event_bus);
    playguard_mon::build_router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_router(Vec::new()).await;
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn empty_journals_list_cleanly() {
    let app = test_router(Vec::new()).await;

    let response = app.clone().oneshot(get("/plays?limit=10")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 0);
    assert_eq!(body["limit"], 10);

    let response = app.oneshot(get("/decisions")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn override_crud_roundtrip() {
    let app = test_router(Vec::new()).await;

    // Create
    let response = app
        .clone()
        .oneshot(post_json(
            "/overrides/artist-1",
            json!({"is_artificial": true, "reason": "synthetic vocals"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Read back
    let response = app.clone().oneshot(get("/overrides/artist-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_artificial"], true);
    assert_eq!(body["reason"], "synthetic vocals");

    // Listed
    let response = app.clone().oneshot(get("/overrides")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["count"], 1);

    // Delete
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/overrides/artist-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Gone
    let response = app.oneshot(get("/overrides/artist-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_override_is_404() {
    let app = test_router(Vec::new()).await;
    let response = app.oneshot(get("/overrides/nobody")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let app = test_router(Vec::new()).await;
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/overrides/nobody")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_artist_is_404() {
    let app = test_router(Vec::new()).await;
    let response = app.oneshot(get("/artists/nobody")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reclassify_runs_the_pipeline() {
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        ScriptedSource::reporting("wikidata", Label::Vtuber),
        ScriptedSource::reporting("lastfm", Label::Vtuber),
    ];
    let app = test_router(adapters).await;

    let response = app
        .oneshot(post_json(
            "/classify/artist-1",
            json!({"artist_name": "Test Artist"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["label"], "vtuber");
    assert_eq!(body["is_artificial"], true);
}

#[tokio::test]
async fn reclassify_bypasses_a_warm_cache() {
    let wikidata = ScriptedSource::reporting("wikidata", Label::Vtuber);
    let lastfm = ScriptedSource::reporting("lastfm", Label::Vtuber);
    let (engine, pool, overrides, event_bus) = engine_with(vec![
        wikidata.clone() as Arc<dyn SourceAdapter>,
        lastfm.clone() as Arc<dyn SourceAdapter>,
    ])
    .await;
    // Warm the cache outside the API
    engine
        .classify(&playguard_common::model::ArtistIdentity::new(
            "artist-1",
            "Test Artist",
        ))
        .await;
    assert_eq!(wikidata.call_count(), 1);

    let state = AppState::new(pool, engine, overrides, event_bus);
    let app = playguard_mon::build_router(state);

    let response = app
        .oneshot(post_json(
            "/classify/artist-1",
            json!({"artist_name": "Test Artist"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(wikidata.call_count(), 2);
}

#[tokio::test]
async fn reclassify_rejects_blank_artist_name() {
    let app = test_router(Vec::new()).await;
    let response = app
        .oneshot(post_json("/classify/artist-1", json!({"artist_name": "  "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
